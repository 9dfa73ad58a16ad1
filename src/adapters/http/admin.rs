//! Administrative endpoints.
//!
//! Force-disconnect operations act on this instance's connections only;
//! in a multi-instance deployment the caller invokes them per instance
//! (or the operation is itself published as a bus event, which is outside
//! this surface).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::UserId;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    closed: usize,
}

const DEFAULT_REASON: &str = "disconnected by administrator";

/// Close every connection of one user on this instance.
pub async fn disconnect_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<DisconnectRequest>,
) -> impl IntoResponse {
    let Ok(user_id) = UserId::new(user_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(DisconnectResponse { closed: 0 }),
        );
    };
    let reason = body.reason.as_deref().unwrap_or(DEFAULT_REASON);
    let closed = state.lifecycle.force_disconnect_user(&user_id, reason).await;
    (StatusCode::OK, Json(DisconnectResponse { closed }))
}

/// Close every connection on this instance.
pub async fn disconnect_all(
    State(state): State<AppState>,
    Json(body): Json<DisconnectRequest>,
) -> impl IntoResponse {
    let reason = body.reason.as_deref().unwrap_or(DEFAULT_REASON);
    let closed = state.lifecycle.force_disconnect_all(reason).await;
    (StatusCode::OK, Json(DisconnectResponse { closed }))
}
