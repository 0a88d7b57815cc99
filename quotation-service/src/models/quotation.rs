//! Quotation aggregate model for quotation-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Quotation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Viewed,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
}

impl QuotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationStatus::Draft => "draft",
            QuotationStatus::Sent => "sent",
            QuotationStatus::Viewed => "viewed",
            QuotationStatus::Accepted => "accepted",
            QuotationStatus::Rejected => "rejected",
            QuotationStatus::Expired => "expired",
            QuotationStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => QuotationStatus::Sent,
            "viewed" => QuotationStatus::Viewed,
            "accepted" => QuotationStatus::Accepted,
            "rejected" => QuotationStatus::Rejected,
            "expired" => QuotationStatus::Expired,
            "cancelled" => QuotationStatus::Cancelled,
            _ => QuotationStatus::Draft,
        }
    }

    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QuotationStatus::Accepted
                | QuotationStatus::Rejected
                | QuotationStatus::Expired
                | QuotationStatus::Cancelled
        )
    }
}

impl std::fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quotation aggregate root. Monetary fields are only ever written by the
/// totals recompute; they are never patched independently.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Quotation {
    pub quotation_id: Uuid,
    pub quotation_number: String,
    pub client_id: Uuid,
    pub created_by: Uuid,
    pub status: String,
    pub quotation_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub sub_total: Decimal,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub total_tax: Decimal,
    pub total_amount: Decimal,
    pub tax_exempt: bool,
    pub tax_zero_rated: bool,
    /// Component-level breakdown from the last totals recompute, kept so
    /// the portal can show how total_tax was assembled.
    pub tax_breakdown: serde_json::Value,
    pub notes: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub last_follow_up_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Quotation {
    pub fn status(&self) -> QuotationStatus {
        QuotationStatus::from_string(&self.status)
    }
}

/// Tax context for a quotation, supplied by the caller (the gateway knows
/// the client's country and jurisdiction; this service does not own client
/// records).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxContext {
    pub country_id: Option<Uuid>,
    pub jurisdiction_id: Option<Uuid>,
    pub tax_exempt: bool,
    pub tax_zero_rated: bool,
}

/// Input for creating a draft quotation.
#[derive(Debug, Clone)]
pub struct CreateQuotation {
    pub client_id: Uuid,
    pub created_by: Uuid,
    pub quotation_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub discount_percentage: Decimal,
    pub notes: Option<String>,
    pub tax: TaxContext,
    pub line_items: Vec<crate::models::CreateLineItem>,
}

/// Input for updating a draft quotation. Updates replace the draft
/// wholesale: line items, discount and tax context all come from the
/// request, and totals are recomputed from scratch.
#[derive(Debug, Clone)]
pub struct UpdateQuotation {
    pub quotation_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub discount_percentage: Decimal,
    pub notes: Option<String>,
    pub tax: TaxContext,
    pub line_items: Vec<crate::models::CreateLineItem>,
}
