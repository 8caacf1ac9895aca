use crate::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use log::*;
use serde_json::json;

/// GET service banner
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is running"),
    )
)]
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "message": "Hanbase System is Running!",
    }))
}

/// GET live realtime session counts per project
#[utoipa::path(
    get,
    path = "/realtime/status",
    responses(
        (status = 200, description = "Snapshot of connected realtime sessions grouped by project"),
    )
)]
pub async fn realtime(State(app_state): State<AppState>) -> impl IntoResponse {
    let stats = app_state.hub.stats();
    trace!("Realtime status: {} session(s)", stats.sessions);

    Json(stats)
}
