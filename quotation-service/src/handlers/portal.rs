//! Client portal: the token in the query string is the only credential.

use crate::dtos::{PortalTokenQuery, SubmitResponseRequest};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub async fn view_quotation(
    State(state): State<AppState>,
    Path(quotation_id): Path<Uuid>,
    Query(query): Query<PortalTokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .quotations
        .access_links()
        .view(quotation_id, &query.token, Utc::now())
        .await?;

    Ok(Json(view))
}

pub async fn submit_response(
    State(state): State<AppState>,
    Path(quotation_id): Path<Uuid>,
    Query(query): Query<PortalTokenQuery>,
    headers: HeaderMap,
    Json(payload): Json<SubmitResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let origin_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    let (response, quotation) = state
        .quotations
        .access_links()
        .respond(
            quotation_id,
            &query.token,
            payload.into_input(origin_ip),
            Utc::now(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "response": response,
            "status": quotation.status,
        })),
    ))
}
