//! Access link model for quotation-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One token-bearing record per send/resend event. Links are never
/// deleted; they are the distribution audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessLink {
    pub link_id: Uuid,
    pub quotation_id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    pub recipient_email: String,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
    pub first_viewed_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub created_utc: DateTime<Utc>,
}

impl AccessLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_active || now > self.expires_at
    }
}

/// Outcome of recording a successful view against a link.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ViewRecord {
    /// True only for the very first successful resolution.
    pub first_view: bool,
    pub view_count: i64,
}
