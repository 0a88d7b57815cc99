//! Tax configuration models for quotation-service.
//!
//! Country → framework → jurisdiction/category → effective-dated rate.
//! A rate carries its component breakdown as plain (name, rate) pairs so
//! the calculation engine works unchanged for one, two or five
//! components.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Country master record. Codes are unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Country {
    pub country_id: Uuid,
    pub code: String,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

/// Tax framework: at most one per country, declaring the ordered set of
/// named components (e.g. ["CGST", "SGST"] or ["VAT"]).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxFramework {
    pub framework_id: Uuid,
    pub country_id: Uuid,
    pub name: String,
    /// Ordered component names, stored as a JSON array.
    pub component_names: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

/// Jurisdiction within a country; optionally nested under a parent
/// jurisdiction of the same country. The tree is cycle-free.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Jurisdiction {
    pub jurisdiction_id: Uuid,
    pub country_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

/// Product/service category used for rate lookup.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductServiceCategory {
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// One named sub-rate contributing additively to a rate's total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRateComponent {
    pub name: String,
    pub rate: Decimal,
}

/// Effective-dated tax rate bound to a framework and optionally a
/// jurisdiction and/or category. `effective_to = None` means open-ended.
/// Exempt and zero-rated are deliberately independent flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxRate {
    pub tax_rate_id: Uuid,
    pub framework_id: Uuid,
    pub jurisdiction_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub rate: Decimal,
    pub is_exempt: bool,
    pub is_zero_rated: bool,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub components: Vec<TaxRateComponent>,
    pub created_utc: DateTime<Utc>,
}

impl TaxRate {
    /// Inclusive-bounds interval containment; open `effective_to` extends
    /// to infinity.
    pub fn is_effective_on(&self, as_of: NaiveDate) -> bool {
        self.effective_from <= as_of && self.effective_to.map_or(true, |to| as_of <= to)
    }
}

/// Database row shape for a tax rate; components are stored as JSON.
#[derive(Debug, Clone, FromRow)]
pub struct TaxRateRow {
    pub tax_rate_id: Uuid,
    pub framework_id: Uuid,
    pub jurisdiction_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub rate: Decimal,
    pub is_exempt: bool,
    pub is_zero_rated: bool,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub components: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

impl TaxRateRow {
    pub fn into_tax_rate(self) -> Result<TaxRate, serde_json::Error> {
        let components: Vec<TaxRateComponent> = serde_json::from_value(self.components)?;
        Ok(TaxRate {
            tax_rate_id: self.tax_rate_id,
            framework_id: self.framework_id,
            jurisdiction_id: self.jurisdiction_id,
            category_id: self.category_id,
            name: self.name,
            rate: self.rate,
            is_exempt: self.is_exempt,
            is_zero_rated: self.is_zero_rated,
            effective_from: self.effective_from,
            effective_to: self.effective_to,
            components,
            created_utc: self.created_utc,
        })
    }
}

/// Input for creating a country.
#[derive(Debug, Clone)]
pub struct CreateCountry {
    pub code: String,
    pub name: String,
}

/// Input for creating a framework.
#[derive(Debug, Clone)]
pub struct CreateTaxFramework {
    pub country_id: Uuid,
    pub name: String,
    pub component_names: Vec<String>,
}

/// Input for creating a jurisdiction.
#[derive(Debug, Clone)]
pub struct CreateJurisdiction {
    pub country_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
}

/// Input for creating a category.
#[derive(Debug, Clone)]
pub struct CreateCategory {
    pub name: String,
    pub description: Option<String>,
}

/// Input for creating a tax rate.
#[derive(Debug, Clone)]
pub struct CreateTaxRate {
    pub framework_id: Uuid,
    pub jurisdiction_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub rate: Decimal,
    pub is_exempt: bool,
    pub is_zero_rated: bool,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub components: Vec<TaxRateComponent>,
}

/// Append-only audit of tax configuration changes and calculations.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxConfigAudit {
    pub audit_id: Uuid,
    pub action: String,
    pub entity_kind: String,
    pub entity_id: Option<Uuid>,
    pub snapshot: serde_json::Value,
    pub actor: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Input for appending an audit entry.
#[derive(Debug, Clone)]
pub struct AppendAudit {
    pub action: String,
    pub entity_kind: String,
    pub entity_id: Option<Uuid>,
    pub snapshot: serde_json::Value,
    pub actor: Option<Uuid>,
}
