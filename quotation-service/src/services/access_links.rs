//! Secure client access links.
//!
//! Tokens are unguessable 256-bit values, generated from the OS CSPRNG and
//! compared in constant time. A quotation has at most one active link; issuing
//! a new one retires its predecessors.

use crate::domain::{self, QuotationEvent, TransitionContext};
use crate::models::{AccessLink, ClientResponse, LineItem, Quotation, SubmitResponse, ViewRecord};
use crate::services::metrics::LINK_VIEWS_TOTAL;
use crate::services::notifier::{Notification, NotificationKind, Notifier};
use crate::services::store::{NewAccessLink, QuotationStore, TransitionWrite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use service_core::error::AppError;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, info, instrument, warn};

/// 256 bits of entropy per token.
const TOKEN_BYTES: usize = 32;

/// Generate a fresh URL-safe access token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time token equality. Length mismatches are rejected without
/// an early-exit timing difference on the compared prefix.
fn token_matches(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Everything the portal renders for a valid link.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PortalView {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub line_items: Vec<LineItem>,
    pub view: ViewRecord,
}

/// Issues links and mediates all client-side (token-bearing) access.
#[derive(Clone)]
pub struct AccessLinkService {
    store: Arc<dyn QuotationStore>,
    notifier: Arc<dyn Notifier>,
}

impl AccessLinkService {
    pub fn new(store: Arc<dyn QuotationStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Issue a new active link for a quotation, retiring any previous ones.
    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    pub async fn issue(
        &self,
        quotation_id: uuid::Uuid,
        recipient_email: String,
        ttl_days: i64,
        now: DateTime<Utc>,
    ) -> Result<AccessLink, AppError> {
        let link = self
            .store
            .create_link(NewAccessLink {
                quotation_id,
                token: generate_token(),
                recipient_email,
                sent_at: now,
                expires_at: now + Duration::days(ttl_days),
            })
            .await?;

        info!(
            quotation_id = %quotation_id,
            link_id = %link.link_id,
            expires_at = %link.expires_at,
            "Access link issued"
        );

        Ok(link)
    }

    /// Resolve a presented token against a quotation's active link.
    ///
    /// An unknown quotation, a retired link and a wrong token all surface as
    /// the same `LinkNotFound`; only a correct token on a lapsed link earns
    /// the distinct expired answer.
    async fn authenticate(
        &self,
        quotation_id: uuid::Uuid,
        presented_token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessLink, AppError> {
        let links = self.store.get_links(quotation_id).await?;

        let link = links
            .into_iter()
            .find(|l| l.is_active && token_matches(&l.token, presented_token));

        let link = match link {
            Some(l) => l,
            None => {
                LINK_VIEWS_TOTAL.with_label_values(&["not_found"]).inc();
                warn!(quotation_id = %quotation_id, "Token rejected");
                return Err(AppError::LinkNotFound);
            }
        };

        if link.is_expired(now) {
            LINK_VIEWS_TOTAL.with_label_values(&["expired"]).inc();
            return Err(AppError::LinkExpired);
        }

        Ok(link)
    }

    /// Record a portal view. The first view of a Sent quotation moves it to
    /// Viewed; later views only bump the counter.
    #[instrument(skip(self, presented_token), fields(quotation_id = %quotation_id))]
    pub async fn view(
        &self,
        quotation_id: uuid::Uuid,
        presented_token: &str,
        now: DateTime<Utc>,
    ) -> Result<PortalView, AppError> {
        let link = self.authenticate(quotation_id, presented_token, now).await?;

        let quotation = self
            .store
            .get_quotation(quotation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("quotation not found")))?;

        // Gate on the state machine before touching the view counter: the
        // link TTL is independent of the validity window, so a live token
        // can still point at a terminal quotation.
        let mut ctx = TransitionContext::new(quotation.valid_until, now.date_naive());
        ctx.token_valid = true;
        let transition = domain::apply(quotation.status(), QuotationEvent::ClientView, &ctx)?;

        let view = self.store.record_view(link.link_id, now).await?;

        let outcome = LINK_VIEWS_TOTAL.with_label_values(&[if view.first_view {
            "first_view"
        } else {
            "repeat_view"
        }]);
        outcome.inc();

        let quotation = if transition.changed {
            let written = self
                .store
                .transition(TransitionWrite {
                    quotation_id,
                    expected_from: transition.from,
                    to: transition.to,
                    actor: None,
                    reason: Some("client viewed quotation".to_string()),
                    mark_sent: false,
                    now,
                })
                .await?;
            match written {
                Some(q) => q,
                // A racing view won the transition; re-read the row.
                None => self
                    .store
                    .get_quotation(quotation_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("quotation not found")))?,
            }
        } else {
            quotation
        };

        let line_items = self.store.get_line_items(quotation_id).await?;

        info!(
            quotation_id = %quotation_id,
            first_view = view.first_view,
            view_count = view.view_count,
            "Portal view recorded"
        );

        Ok(PortalView {
            quotation,
            line_items,
            view,
        })
    }

    /// Submit the client's accept/reject decision.
    #[instrument(skip(self, presented_token, input), fields(quotation_id = %quotation_id))]
    pub async fn respond(
        &self,
        quotation_id: uuid::Uuid,
        presented_token: &str,
        input: SubmitResponse,
        now: DateTime<Utc>,
    ) -> Result<(ClientResponse, Quotation), AppError> {
        let _link = self.authenticate(quotation_id, presented_token, now).await?;

        let quotation = self
            .store
            .get_quotation(quotation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("quotation not found")))?;

        if self.store.get_response(quotation_id).await?.is_some() {
            return Err(AppError::DuplicateResponse);
        }

        let mut ctx = TransitionContext::new(quotation.valid_until, now.date_naive());
        ctx.token_valid = true;
        let transition = domain::apply(
            quotation.status(),
            QuotationEvent::ClientRespond(input.response_type),
            &ctx,
        )?;

        let (response, quotation) = self
            .store
            .record_response(
                quotation_id,
                input,
                TransitionWrite {
                    quotation_id,
                    expected_from: transition.from,
                    to: transition.to,
                    actor: None,
                    reason: Some("client response".to_string()),
                    mark_sent: false,
                    now,
                },
            )
            .await?;

        // Confirmation is best-effort; the recorded response stands either way.
        let confirmation = Notification {
            kind: NotificationKind::ResponseReceived,
            to: response.respondent_email.clone(),
            subject: format!(
                "We received your response to quotation {}",
                quotation.quotation_number
            ),
            body: format!(
                "Your decision ({}) on quotation {} has been recorded.",
                response.response_type, quotation.quotation_number
            ),
        };
        if let Err(err) = self.notifier.send(confirmation).await {
            error!(
                quotation_id = %quotation_id,
                error = %err,
                "Failed to send response confirmation"
            );
        }

        info!(
            quotation_id = %quotation_id,
            response_type = %response.response_type,
            new_status = %quotation.status,
            "Client response recorded"
        );

        Ok((response, quotation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32 bytes base64url without padding is 43 characters.
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn token_comparison_rejects_mismatch() {
        let token = generate_token();
        assert!(token_matches(&token, &token));
        assert!(!token_matches(&token, "wrong"));
        assert!(!token_matches(&token, &generate_token()));
    }
}
