//! HTTP adapter: health, diagnostics, and administrative routes.
//!
//! The chat REST surface (conversation CRUD, message history) lives in a
//! separate service; this process exposes only what the realtime core
//! needs exercised.

mod admin;
mod health;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::adapters::websocket::ConnectionLifecycle;
use crate::application::health::HealthService;

/// Shared state for the HTTP routes.
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthService>,
    pub lifecycle: Arc<ConnectionLifecycle>,
}

/// Router for health and admin endpoints.
pub fn http_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::full))
        .route("/health/live", get(health::live))
        .route("/stats", get(health::stats))
        .route("/admin/connections/:user_id/disconnect", post(admin::disconnect_user))
        .route("/admin/connections/disconnect", post(admin::disconnect_all))
        .with_state(state)
}
