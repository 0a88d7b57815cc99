use crate::services::metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "quotation-service" }))
}

/// Readiness covers the database; a service without its store is not ready.
pub async fn ready(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    if let Some(pg) = &state.pg {
        pg.health_check().await?;
    }
    Ok(Json(json!({ "status": "ready" })))
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::get_metrics(),
    )
}
