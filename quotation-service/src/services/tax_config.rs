//! Tax configuration: countries, frameworks, jurisdictions, categories and
//! effective-dated rates.
//!
//! All structural invariants (unique codes, one framework per country,
//! acyclic same-country jurisdiction trees, non-overlapping rate intervals,
//! component sums) are enforced here at write time so the read path can
//! trust the configuration blindly. Every change appends an audit row.

use crate::domain::tax_resolver::{
    validate_components, validate_jurisdiction_parent, validate_no_overlap,
};
use crate::models::{
    AppendAudit, Country, CreateCategory, CreateCountry, CreateJurisdiction, CreateTaxFramework,
    CreateTaxRate, Jurisdiction, ProductServiceCategory, TaxFramework, TaxRate,
};
use crate::services::store::QuotationStore;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct TaxConfigService {
    store: Arc<dyn QuotationStore>,
}

impl TaxConfigService {
    pub fn new(store: Arc<dyn QuotationStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, input, actor))]
    pub async fn create_country(
        &self,
        input: CreateCountry,
        actor: Uuid,
    ) -> Result<Country, AppError> {
        if input.code.trim().is_empty() || input.name.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "country code and name are required"
            )));
        }

        let country = self
            .store
            .create_country(CreateCountry {
                code: input.code.trim().to_uppercase(),
                name: input.name.trim().to_string(),
            })
            .await?;

        self.audit("country_created", "country", country.country_id, &country, actor)
            .await;

        Ok(country)
    }

    pub async fn list_countries(&self) -> Result<Vec<Country>, AppError> {
        self.store.list_countries().await
    }

    #[instrument(skip(self, input, actor), fields(country_id = %input.country_id))]
    pub async fn create_framework(
        &self,
        input: CreateTaxFramework,
        actor: Uuid,
    ) -> Result<TaxFramework, AppError> {
        if input.name.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "framework name is required"
            )));
        }
        if input.component_names.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "a framework needs at least one component name"
            )));
        }

        let framework = self.store.create_framework(input).await?;

        self.audit(
            "framework_created",
            "tax_framework",
            framework.framework_id,
            &framework,
            actor,
        )
        .await;

        Ok(framework)
    }

    pub async fn get_framework(
        &self,
        framework_id: Uuid,
    ) -> Result<TaxFramework, AppError> {
        self.store
            .get_framework(framework_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("tax framework not found")))
    }

    #[instrument(skip(self, input, actor), fields(country_id = %input.country_id))]
    pub async fn create_jurisdiction(
        &self,
        input: CreateJurisdiction,
        actor: Uuid,
    ) -> Result<Jurisdiction, AppError> {
        if input.name.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "jurisdiction name is required"
            )));
        }

        if let Some(parent_id) = input.parent_id {
            let all = self.store.list_jurisdictions(None).await?;
            validate_jurisdiction_parent(None, input.country_id, parent_id, &all)?;
        }

        let jurisdiction = self.store.create_jurisdiction(input).await?;

        self.audit(
            "jurisdiction_created",
            "jurisdiction",
            jurisdiction.jurisdiction_id,
            &jurisdiction,
            actor,
        )
        .await;

        Ok(jurisdiction)
    }

    pub async fn list_jurisdictions(
        &self,
        country_id: Option<Uuid>,
    ) -> Result<Vec<Jurisdiction>, AppError> {
        self.store.list_jurisdictions(country_id).await
    }

    #[instrument(skip(self, input, actor))]
    pub async fn create_category(
        &self,
        input: CreateCategory,
        actor: Uuid,
    ) -> Result<ProductServiceCategory, AppError> {
        if input.name.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "category name is required"
            )));
        }

        let category = self.store.create_category(input).await?;

        self.audit(
            "category_created",
            "category",
            category.category_id,
            &category,
            actor,
        )
        .await;

        Ok(category)
    }

    pub async fn list_categories(&self) -> Result<Vec<ProductServiceCategory>, AppError> {
        self.store.list_categories().await
    }

    /// Create a rate after running the overlap and component validators
    /// against the framework's existing rates.
    #[instrument(skip(self, input, actor), fields(framework_id = %input.framework_id))]
    pub async fn create_tax_rate(
        &self,
        input: CreateTaxRate,
        actor: Uuid,
    ) -> Result<TaxRate, AppError> {
        validate_components(
            input.rate,
            input.is_exempt,
            input.is_zero_rated,
            &input.components,
        )?;

        // NotFound before any interval work when the framework is bogus.
        self.get_framework(input.framework_id).await?;

        let existing = self
            .store
            .list_rates_for_framework(input.framework_id)
            .await?;
        validate_no_overlap(
            &existing,
            input.jurisdiction_id,
            input.category_id,
            input.effective_from,
            input.effective_to,
        )?;

        let rate = self.store.create_tax_rate(input).await?;

        self.audit("rate_created", "tax_rate", rate.tax_rate_id, &rate, actor)
            .await;

        Ok(rate)
    }

    pub async fn get_tax_rate(&self, tax_rate_id: Uuid) -> Result<TaxRate, AppError> {
        self.store
            .get_tax_rate(tax_rate_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("tax rate not found")))
    }

    pub async fn list_rates(&self, framework_id: Uuid) -> Result<Vec<TaxRate>, AppError> {
        self.store.list_rates_for_framework(framework_id).await
    }

    async fn audit<T: serde::Serialize>(
        &self,
        action: &str,
        entity_kind: &str,
        entity_id: Uuid,
        snapshot: &T,
        actor: Uuid,
    ) {
        let entry = AppendAudit {
            action: action.to_string(),
            entity_kind: entity_kind.to_string(),
            entity_id: Some(entity_id),
            snapshot: serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
            actor: Some(actor),
        };
        if let Err(e) = self.store.append_audit(entry).await {
            error!(action = action, error = %e, "Failed to append audit entry");
        }
    }
}
