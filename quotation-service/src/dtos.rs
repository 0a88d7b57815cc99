//! Request and response shapes for the HTTP surface.

use crate::models::{
    AccessLink, CreateLineItem, CreateQuotation, Quotation, ResponseType, SubmitResponse,
    TaxContext, UpdateQuotation,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

fn default_false() -> bool {
    false
}

fn default_zero() -> Decimal {
    Decimal::ZERO
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub name: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub category_id: Option<Uuid>,
}

impl From<LineItemRequest> for CreateLineItem {
    fn from(req: LineItemRequest) -> Self {
        CreateLineItem {
            name: req.name,
            quantity: req.quantity,
            unit_rate: req.unit_rate,
            category_id: req.category_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuotationRequest {
    pub client_id: Uuid,
    pub quotation_date: NaiveDate,
    pub valid_until: NaiveDate,
    #[serde(default = "default_zero")]
    pub discount_percentage: Decimal,
    pub notes: Option<String>,
    pub country_id: Option<Uuid>,
    pub jurisdiction_id: Option<Uuid>,
    #[serde(default = "default_false")]
    pub tax_exempt: bool,
    #[serde(default = "default_false")]
    pub tax_zero_rated: bool,
    #[serde(default)]
    pub line_items: Vec<LineItemRequest>,
}

impl CreateQuotationRequest {
    pub fn into_input(self, created_by: Uuid) -> CreateQuotation {
        CreateQuotation {
            client_id: self.client_id,
            created_by,
            quotation_date: self.quotation_date,
            valid_until: self.valid_until,
            discount_percentage: self.discount_percentage,
            notes: self.notes,
            tax: TaxContext {
                country_id: self.country_id,
                jurisdiction_id: self.jurisdiction_id,
                tax_exempt: self.tax_exempt,
                tax_zero_rated: self.tax_zero_rated,
            },
            line_items: self.line_items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateQuotationRequest {
    pub quotation_date: NaiveDate,
    pub valid_until: NaiveDate,
    #[serde(default = "default_zero")]
    pub discount_percentage: Decimal,
    pub notes: Option<String>,
    pub country_id: Option<Uuid>,
    pub jurisdiction_id: Option<Uuid>,
    #[serde(default = "default_false")]
    pub tax_exempt: bool,
    #[serde(default = "default_false")]
    pub tax_zero_rated: bool,
    #[serde(default)]
    pub line_items: Vec<LineItemRequest>,
}

impl From<UpdateQuotationRequest> for UpdateQuotation {
    fn from(req: UpdateQuotationRequest) -> Self {
        UpdateQuotation {
            quotation_date: req.quotation_date,
            valid_until: req.valid_until,
            discount_percentage: req.discount_percentage,
            notes: req.notes,
            tax: TaxContext {
                country_id: req.country_id,
                jurisdiction_id: req.jurisdiction_id,
                tax_exempt: req.tax_exempt,
                tax_zero_rated: req.tax_zero_rated,
            },
            line_items: req.line_items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendQuotationRequest {
    #[validate(email)]
    pub recipient_email: String,
}

/// The send/resend response carries the link id and expiry but not the
/// token; that travels only in the client's email.
#[derive(Debug, Clone, Serialize)]
pub struct SendQuotationResponse {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub link: AccessLink,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalTokenQuery {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitResponseRequest {
    pub response_type: ResponseType,
    #[validate(length(min = 1, max = 200))]
    pub respondent_name: String,
    #[validate(email)]
    pub respondent_email: String,
    pub message: Option<String>,
}

impl SubmitResponseRequest {
    pub fn into_input(self, origin_ip: Option<String>) -> SubmitResponse {
        SubmitResponse {
            response_type: self.response_type,
            respondent_name: self.respondent_name,
            respondent_email: self.respondent_email,
            message: self.message,
            origin_ip,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCountryRequest {
    #[validate(length(min = 2, max = 3))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateFrameworkRequest {
    pub country_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub component_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateJurisdictionRequest {
    pub country_id: Uuid,
    pub parent_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxRateComponentRequest {
    pub name: String,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTaxRateRequest {
    pub framework_id: Uuid,
    pub jurisdiction_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub rate: Decimal,
    #[serde(default = "default_false")]
    pub is_exempt: bool,
    #[serde(default = "default_false")]
    pub is_zero_rated: bool,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    #[serde(default)]
    pub components: Vec<TaxRateComponentRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JurisdictionListParams {
    pub country_id: Option<Uuid>,
}
