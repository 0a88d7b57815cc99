//! Client response model for quotation-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Accept or reject, as declared by the responding client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Accepted,
    Rejected,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Accepted => "accepted",
            ResponseType::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "rejected" => ResponseType::Rejected,
            _ => ResponseType::Accepted,
        }
    }
}

/// At most one per quotation; first response wins.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClientResponse {
    pub response_id: Uuid,
    pub quotation_id: Uuid,
    pub response_type: String,
    pub respondent_name: String,
    pub respondent_email: String,
    pub message: Option<String>,
    pub origin_ip: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for submitting a client response via an access link.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub response_type: ResponseType,
    pub respondent_name: String,
    pub respondent_email: String,
    pub message: Option<String>,
    pub origin_ip: Option<String>,
}
