//! attune HTTP server binary.
//!
//! Starts the axum server, wires the core (metadata manager, dispatcher,
//! consolidation worker), and runs the idle reaper on its own task.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `OPENAI_API_KEY` — reasoning-provider credential (required)
//! - `OPENAI_BASE_URL` — provider endpoint (default: `https://api.openai.com/v1`)
//! - `ATTUNE_MODEL` — model identifier (default: `gpt-4o`)
//! - `ATTUNE_DB_PATH` — SQLite database path (default: `attune.db`)
//! - `ATTUNE_IDLE_THRESHOLD_SECS` — inactivity before consolidation (default: 300)
//! - `ATTUNE_POLL_INTERVAL_SECS` — reaper poll period (default: 60)
//! - `RUST_LOG` — tracing filter (default: `info,attune=debug`)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use attune::capability::CapabilityRegistry;
use attune::config::Settings;
use attune::consolidation::reaper::IdleReaper;
use attune::consolidation::ConsolidationWorker;
use attune::metadata::manager::MetadataManager;
use attune::metadata::store::SqliteMetadataStore;
use attune::router::Dispatcher;
use attune::server::{app_router, AppState, CoreState};
use attune::session::activity::ActivityTracker;
use attune::session::ConversationBuffer;
use attune::users::UserDirectory;
use parking_lot::RwLock;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,attune=debug".into()),
        )
        .init();

    let settings = Settings::from_env();
    let bind_addr = format!("0.0.0.0:{}", settings.port);

    let store = SqliteMetadataStore::new(&settings.database_path)
        .expect("Failed to open metadata store");
    let users = UserDirectory::new(&settings.database_path)
        .expect("Failed to open user directory");
    let registry = Arc::new(
        CapabilityRegistry::from_settings(&settings)
            .expect("Failed to build capability registry"),
    );

    let metadata = Arc::new(MetadataManager::new(Arc::new(store)));
    let buffer = Arc::new(ConversationBuffer::new());
    let activity = Arc::new(ActivityTracker::new());

    let dispatcher = Dispatcher::new(registry.clone(), metadata.clone(), buffer.clone());
    let worker = Arc::new(ConsolidationWorker::new(
        registry.extractor(),
        metadata.clone(),
        buffer.clone(),
    ));

    let reaper = IdleReaper::new(
        activity.clone(),
        worker,
        settings.idle_threshold,
        settings.poll_interval,
    )
    .spawn();

    let state = AppState {
        core: Arc::new(CoreState {
            users,
            metadata,
            buffer,
            activity,
            dispatcher,
            active_user: RwLock::new(None),
        }),
    };
    let app = app_router(state);

    tracing::info!("attune server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health — liveness probe");
    tracing::info!("  POST /signup — register");
    tracing::info!("  POST /signin — establish session identity");
    tracing::info!("  POST /invoke — route one conversational turn");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .expect("Server failed");

    reaper.stop().await;
}
