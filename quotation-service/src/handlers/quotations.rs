//! Internal quotation API. Every route requires an `Actor` from the
//! gateway headers; ownership checks happen in the service layer.

use crate::dtos::{
    CreateQuotationRequest, SendQuotationRequest, SendQuotationResponse, UpdateQuotationRequest,
};
use crate::middleware::Actor;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub async fn create_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateQuotationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let view = state
        .quotations
        .create(payload.into_input(actor.user_id))
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(quotation_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.quotations.get(quotation_id, &actor).await?;
    Ok(Json(view))
}

pub async fn update_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(quotation_id): Path<Uuid>,
    Json(payload): Json<UpdateQuotationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let view = state
        .quotations
        .update(quotation_id, payload.into(), &actor, Utc::now())
        .await?;

    Ok(Json(view))
}

pub async fn delete_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(quotation_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let quotation = state
        .quotations
        .delete(quotation_id, &actor, Utc::now())
        .await?;

    Ok(Json(quotation))
}

pub async fn send_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(quotation_id): Path<Uuid>,
    Json(payload): Json<SendQuotationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let (quotation, link) = state
        .quotations
        .send(quotation_id, payload.recipient_email, &actor, Utc::now())
        .await?;

    Ok(Json(SendQuotationResponse { quotation, link }))
}

pub async fn resend_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(quotation_id): Path<Uuid>,
    Json(payload): Json<SendQuotationRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let (quotation, link) = state
        .quotations
        .resend(quotation_id, payload.recipient_email, &actor, Utc::now())
        .await?;

    Ok(Json(SendQuotationResponse { quotation, link }))
}

pub async fn get_history(
    State(state): State<AppState>,
    actor: Actor,
    Path(quotation_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let history = state.quotations.history(quotation_id, &actor).await?;
    Ok(Json(history))
}

pub async fn get_links(
    State(state): State<AppState>,
    actor: Actor,
    Path(quotation_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let links = state.quotations.links(quotation_id, &actor).await?;
    Ok(Json(links))
}
