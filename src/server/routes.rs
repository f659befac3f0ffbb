//! Axum route handlers.
//!
//! The HTTP layer is a thin wrapper: parse, delegate to the core, shape
//! the response. Dispatch failures surface to clients as a generic "no
//! response generated" body — the detail goes to the log, not the wire.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::metadata::manager::MetadataManager;
use crate::router::Dispatcher;
use crate::session::activity::ActivityTracker;
use crate::session::ConversationBuffer;
use crate::users::{DirectoryError, UserDirectory};

/// Everything the handlers need, constructed once at startup and passed by
/// handle — no module-level state.
pub struct CoreState {
    pub users: UserDirectory,
    pub metadata: Arc<MetadataManager>,
    pub buffer: Arc<ConversationBuffer>,
    pub activity: Arc<ActivityTracker>,
    pub dispatcher: Dispatcher,
    /// Session identity established by the most recent `/signin`.
    pub active_user: RwLock<Option<String>>,
}

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<CoreState>,
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/signup", post(signup_handler))
        .route("/signin", post(signin_handler))
        .route("/invoke", post(invoke_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct InvokeRequest {
    user_input: String,
    /// Optional override for multi-user clients; defaults to the identity
    /// established by `/signin`.
    #[serde(default)]
    user_id: Option<String>,
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "attune",
    }))
}

/// POST /signup — register a username/password.
async fn signup_handler(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let account = state
        .core
        .users
        .register(&credentials.username, &credentials.password)
        .await
        .map_err(directory_error)?;

    Ok(Json(serde_json::json!(account)))
}

/// POST /signin — verify credentials and establish the active session
/// identity used as `user_id` by subsequent `/invoke` calls.
async fn signin_handler(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let account = state
        .core
        .users
        .verify(&credentials.username, &credentials.password)
        .await
        .map_err(directory_error)?;

    *state.core.active_user.write() = Some(account.user_id.clone());
    tracing::info!(user_id = %account.user_id, "session established");

    Ok(Json(serde_json::json!(account)))
}

/// POST /invoke — route one conversational turn for the active user.
async fn invoke_handler(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let user_id = request
        .user_id
        .or_else(|| state.core.active_user.read().clone())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "not signed in"})),
            )
        })?;

    // Every inbound turn resets the idle clock.
    state.core.activity.touch(&user_id, Utc::now());

    match state.core.dispatcher.route(&user_id, &request.user_input).await {
        Ok(reply) => Ok(Json(serde_json::json!({ "reply": reply }))),
        Err(error) => {
            tracing::error!(user_id = %user_id, %error, "dispatch failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "no response generated"})),
            ))
        }
    }
}

fn directory_error(error: DirectoryError) -> (StatusCode, Json<Value>) {
    let status = match error {
        DirectoryError::UsernameTaken | DirectoryError::InvalidCredentials => {
            StatusCode::BAD_REQUEST
        }
        DirectoryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"error": error.to_string()})))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
