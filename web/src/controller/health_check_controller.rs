use crate::{AppState, Error};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET whether the API and its database are able to serve requests
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "API router is up and the database answers", body = String),
        (status = 503, description = "Database is unreachable")
    )
)]
pub async fn health_check(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    app_state.db_conn_ref().ping().await?;

    Ok((StatusCode::OK, "healthy"))
}
