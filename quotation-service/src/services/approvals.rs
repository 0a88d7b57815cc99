//! Discount approval gate.
//!
//! Sending is blocked while a quotation's discount sits above the approval
//! threshold. The trait seam lets a real approval workflow replace the
//! threshold rule without touching the send path.

use crate::models::Quotation;
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::warn;

#[async_trait]
pub trait ApprovalGateway: Send + Sync {
    /// True when an unresolved approval blocks sending this quotation.
    async fn send_blocked(&self, quotation: &Quotation) -> Result<bool, AppError>;

    /// Raise a long-pending approval with the external approval system.
    async fn escalate(&self, quotation: &Quotation) -> Result<(), AppError>;
}

/// Blocks any discount above a fixed percentage threshold.
pub struct DiscountThresholdGateway {
    max_unapproved_discount: Decimal,
}

impl DiscountThresholdGateway {
    pub fn new(max_unapproved_discount: Decimal) -> Self {
        Self {
            max_unapproved_discount,
        }
    }
}

#[async_trait]
impl ApprovalGateway for DiscountThresholdGateway {
    async fn send_blocked(&self, quotation: &Quotation) -> Result<bool, AppError> {
        Ok(quotation.discount_percentage > self.max_unapproved_discount)
    }

    async fn escalate(&self, quotation: &Quotation) -> Result<(), AppError> {
        // The threshold rule has no workflow to poke; escalation is a
        // visibility event until a real approval system is wired in.
        warn!(
            quotation_id = %quotation.quotation_id,
            discount_percentage = %quotation.discount_percentage,
            "Discount approval pending past the escalation threshold"
        );
        Ok(())
    }
}