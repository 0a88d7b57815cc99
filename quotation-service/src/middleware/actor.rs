//! Actor extraction for the internal API.
//!
//! The trusted gateway authenticates callers and forwards identity as
//! `X-User-Id` / `X-User-Role` headers; this service only interprets them.
//! Portal routes carry no actor and never use this extractor.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    Member,
    Manager,
    Admin,
}

impl ActorRole {
    fn from_header(value: &str) -> Self {
        match value {
            "manager" => ActorRole::Manager,
            "admin" => ActorRole::Admin,
            _ => ActorRole::Member,
        }
    }
}

/// The authenticated internal caller.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    /// Managers and admins may act on quotations they do not own.
    pub fn is_elevated(&self) -> bool {
        matches!(self.role, ActorRole::Manager | ActorRole::Admin)
    }

    /// Owner-or-elevated check used by every internal quotation route.
    pub fn authorize(&self, owner: Uuid) -> Result<(), AppError> {
        if self.user_id == owner || self.is_elevated() {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "caller does not own this quotation"
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing {} header", USER_ID_HEADER))
            })?;

        let user_id = Uuid::parse_str(user_id).map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("Invalid {} header", USER_ID_HEADER))
        })?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ActorRole::from_header)
            .unwrap_or(ActorRole::Member);

        Ok(Actor { user_id, role })
    }
}
