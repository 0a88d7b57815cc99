//! Status history model for quotation-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only status trail entry. `previous_status` is null only for the
/// first entry of a quotation; `actor` is null for system-originated
/// transitions (auto-expiry).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatusHistoryEntry {
    pub entry_id: Uuid,
    pub quotation_id: Uuid,
    pub previous_status: Option<String>,
    pub new_status: String,
    pub actor: Option<Uuid>,
    pub reason: Option<String>,
    pub created_utc: DateTime<Utc>,
}
