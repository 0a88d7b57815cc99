//! Line item model for quotation-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item on a quotation. Owned by the quotation; immutable once the
/// quotation leaves draft.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub quotation_id: Uuid,
    pub sort_order: i32,
    pub name: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub amount: Decimal,
    pub category_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a line item. `amount` is derived, never supplied.
#[derive(Debug, Clone)]
pub struct CreateLineItem {
    pub name: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub category_id: Option<Uuid>,
}

impl CreateLineItem {
    pub fn amount(&self) -> Decimal {
        self.quantity * self.unit_rate
    }
}
