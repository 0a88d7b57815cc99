//! Tax configuration API. Creation routes require an elevated role.

use crate::dtos::{
    CreateCategoryRequest, CreateCountryRequest, CreateFrameworkRequest,
    CreateJurisdictionRequest, CreateTaxRateRequest, JurisdictionListParams,
};
use crate::middleware::Actor;
use crate::models::{
    CreateCategory, CreateCountry, CreateJurisdiction, CreateTaxFramework, CreateTaxRate,
    TaxRateComponent,
};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

fn require_elevated(actor: &Actor) -> Result<(), AppError> {
    if actor.is_elevated() {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "tax configuration requires a manager or admin role"
        )))
    }
}

pub async fn create_country(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateCountryRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_elevated(&actor)?;
    payload.validate()?;

    let country = state
        .tax_config
        .create_country(
            CreateCountry {
                code: payload.code,
                name: payload.name,
            },
            actor.user_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(country)))
}

pub async fn list_countries(
    State(state): State<AppState>,
    _actor: Actor,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tax_config.list_countries().await?))
}

pub async fn create_framework(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateFrameworkRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_elevated(&actor)?;
    payload.validate()?;

    let framework = state
        .tax_config
        .create_framework(
            CreateTaxFramework {
                country_id: payload.country_id,
                name: payload.name,
                component_names: payload.component_names,
            },
            actor.user_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(framework)))
}

pub async fn get_framework(
    State(state): State<AppState>,
    _actor: Actor,
    Path(framework_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tax_config.get_framework(framework_id).await?))
}

pub async fn create_jurisdiction(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateJurisdictionRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_elevated(&actor)?;
    payload.validate()?;

    let jurisdiction = state
        .tax_config
        .create_jurisdiction(
            CreateJurisdiction {
                country_id: payload.country_id,
                parent_id: payload.parent_id,
                name: payload.name,
            },
            actor.user_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(jurisdiction)))
}

pub async fn list_jurisdictions(
    State(state): State<AppState>,
    _actor: Actor,
    Query(params): Query<JurisdictionListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state.tax_config.list_jurisdictions(params.country_id).await?,
    ))
}

pub async fn create_category(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_elevated(&actor)?;
    payload.validate()?;

    let category = state
        .tax_config
        .create_category(
            CreateCategory {
                name: payload.name,
                description: payload.description,
            },
            actor.user_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_categories(
    State(state): State<AppState>,
    _actor: Actor,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tax_config.list_categories().await?))
}

pub async fn create_tax_rate(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateTaxRateRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_elevated(&actor)?;
    payload.validate()?;

    let rate = state
        .tax_config
        .create_tax_rate(
            CreateTaxRate {
                framework_id: payload.framework_id,
                jurisdiction_id: payload.jurisdiction_id,
                category_id: payload.category_id,
                name: payload.name,
                rate: payload.rate,
                is_exempt: payload.is_exempt,
                is_zero_rated: payload.is_zero_rated,
                effective_from: payload.effective_from,
                effective_to: payload.effective_to,
                components: payload
                    .components
                    .into_iter()
                    .map(|c| TaxRateComponent {
                        name: c.name,
                        rate: c.rate,
                    })
                    .collect(),
            },
            actor.user_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(rate)))
}

pub async fn get_tax_rate(
    State(state): State<AppState>,
    _actor: Actor,
    Path(tax_rate_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tax_config.get_tax_rate(tax_rate_id).await?))
}

pub async fn list_framework_rates(
    State(state): State<AppState>,
    _actor: Actor,
    Path(framework_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.tax_config.list_rates(framework_id).await?))
}
