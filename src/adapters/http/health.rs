//! Health endpoints.
//!
//! `GET /health` runs the full dependency probe and returns 503 when both
//! the bus and the store are down. `GET /health/live` is the fast liveness
//! probe for tight polling intervals; it performs no I/O.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::application::health::ServiceStatus;

use super::AppState;

/// Full health snapshot with dependency details.
pub async fn full(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.check().await;
    let status = match snapshot.status {
        ServiceStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(snapshot))
}

/// Minimal liveness probe.
pub async fn live(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.liveness())
}

/// Local connection statistics.
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.lifecycle.registry().stats().await)
}
