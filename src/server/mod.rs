//! HTTP surface for the orchestrator.
//!
//! # Endpoints
//!
//! - `GET  /health`  — Liveness probe
//! - `POST /signup`  — Register a username/password
//! - `POST /signin`  — Establish the active session identity
//! - `POST /invoke`  — Route one conversational turn

pub mod routes;

pub use routes::{app_router, AppState, CoreState};
