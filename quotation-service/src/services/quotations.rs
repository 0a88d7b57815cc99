//! Quotation application service: the internal API's write path.
//!
//! Every monetary column goes through `compute_totals`; every status write
//! goes through the state machine and a conditional store transition. The
//! service owns authorization (owner or elevated role) but not identity,
//! which arrives pre-verified from the gateway.

use crate::domain::{self, QuotationEvent, QuotationTotals, TransitionContext};
use crate::domain::tax_resolver::jurisdiction_chain;
use crate::middleware::Actor;
use crate::models::{
    AccessLink, AppendAudit, CreateLineItem, CreateQuotation, LineItem, Quotation,
    StatusHistoryEntry, TaxContext, TaxRate, UpdateQuotation,
};
use crate::services::access_links::AccessLinkService;
use crate::services::approvals::ApprovalGateway;
use crate::services::metrics::QUOTATIONS_TOTAL;
use crate::services::notifier::{Notification, NotificationKind, Notifier};
use crate::services::store::{
    validate_discount, DraftUpdate, NewQuotation, QuotationStore, TransitionWrite,
};
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// A quotation with its line items and computed tax breakdown, as the
/// internal API and the portal both return it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QuotationView {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub line_items: Vec<LineItem>,
}

#[derive(Clone)]
pub struct QuotationService {
    store: Arc<dyn QuotationStore>,
    approvals: Arc<dyn ApprovalGateway>,
    notifier: Arc<dyn Notifier>,
    links: AccessLinkService,
    link_ttl_days: i64,
    portal_base_url: String,
}

impl QuotationService {
    pub fn new(
        store: Arc<dyn QuotationStore>,
        approvals: Arc<dyn ApprovalGateway>,
        notifier: Arc<dyn Notifier>,
        link_ttl_days: i64,
        portal_base_url: String,
    ) -> Self {
        let links = AccessLinkService::new(store.clone(), notifier.clone());
        Self {
            store,
            approvals,
            notifier,
            links,
            link_ttl_days,
            portal_base_url,
        }
    }

    fn portal_url(&self, quotation_id: Uuid, token: &str) -> String {
        format!(
            "{}/portal/quotations/{}?token={}",
            self.portal_base_url, quotation_id, token
        )
    }

    pub fn access_links(&self) -> &AccessLinkService {
        &self.links
    }

    /// Create a draft quotation with totals computed up front.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create(&self, input: CreateQuotation) -> Result<QuotationView, AppError> {
        validate_discount(input.discount_percentage)?;
        validate_dates(input.quotation_date, input.valid_until)?;
        validate_line_items(&input.line_items)?;

        let totals = self
            .compute(
                &input.line_items,
                input.discount_percentage,
                &input.tax,
                input.quotation_date,
            )
            .await?;

        let quotation = self
            .store
            .create_quotation(NewQuotation {
                client_id: input.client_id,
                created_by: input.created_by,
                quotation_date: input.quotation_date,
                valid_until: input.valid_until,
                notes: input.notes,
                tax_exempt: input.tax.tax_exempt,
                tax_zero_rated: input.tax.tax_zero_rated,
                totals: totals.clone(),
                line_items: input.line_items,
            })
            .await?;

        self.audit_calculation(&quotation, &totals, Some(quotation.created_by))
            .await;

        QUOTATIONS_TOTAL.with_label_values(&["created"]).inc();

        let line_items = self.store.get_line_items(quotation.quotation_id).await?;
        Ok(QuotationView {
            quotation,
            line_items,
        })
    }

    #[instrument(skip(self, actor), fields(quotation_id = %quotation_id))]
    pub async fn get(
        &self,
        quotation_id: Uuid,
        actor: &Actor,
    ) -> Result<QuotationView, AppError> {
        let quotation = self.fetch_authorized(quotation_id, actor).await?;
        let line_items = self.store.get_line_items(quotation_id).await?;
        Ok(QuotationView {
            quotation,
            line_items,
        })
    }

    /// Replace a draft quotation and recompute its totals.
    #[instrument(skip(self, input, actor), fields(quotation_id = %quotation_id))]
    pub async fn update(
        &self,
        quotation_id: Uuid,
        input: UpdateQuotation,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<QuotationView, AppError> {
        validate_discount(input.discount_percentage)?;
        validate_dates(input.quotation_date, input.valid_until)?;
        validate_line_items(&input.line_items)?;

        let quotation = self.fetch_authorized(quotation_id, actor).await?;
        if quotation.status() != crate::models::QuotationStatus::Draft {
            return Err(AppError::InvalidStateTransition {
                current: quotation.status.clone(),
                event: "update".to_string(),
                reason: "only draft quotations can be edited".to_string(),
            });
        }

        let totals = self
            .compute(
                &input.line_items,
                input.discount_percentage,
                &input.tax,
                input.quotation_date,
            )
            .await?;

        let updated = self
            .store
            .update_draft(
                quotation_id,
                DraftUpdate {
                    quotation_date: input.quotation_date,
                    valid_until: input.valid_until,
                    notes: input.notes,
                    tax_exempt: input.tax.tax_exempt,
                    tax_zero_rated: input.tax.tax_zero_rated,
                    totals: totals.clone(),
                    line_items: input.line_items,
                },
                now,
            )
            .await?
            .ok_or_else(|| AppError::InvalidStateTransition {
                current: "unknown".to_string(),
                event: "update".to_string(),
                reason: "quotation left draft concurrently".to_string(),
            })?;

        self.audit_calculation(&updated, &totals, Some(actor.user_id))
            .await;

        let line_items = self.store.get_line_items(quotation_id).await?;
        Ok(QuotationView {
            quotation: updated,
            line_items,
        })
    }

    /// Send a draft to the client: Draft → Sent plus a fresh access link
    /// and a notification.
    #[instrument(skip(self, actor), fields(quotation_id = %quotation_id))]
    pub async fn send(
        &self,
        quotation_id: Uuid,
        recipient_email: String,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(Quotation, AccessLink), AppError> {
        let quotation = self.fetch_authorized(quotation_id, actor).await?;
        let line_items = self.store.get_line_items(quotation_id).await?;

        let mut ctx = TransitionContext::new(quotation.valid_until, now.date_naive());
        ctx.line_item_count = line_items.len();
        ctx.approval_blocked = self.approvals.send_blocked(&quotation).await?;

        let transition = domain::apply(quotation.status(), QuotationEvent::Send, &ctx)?;

        let quotation = self
            .store
            .transition(TransitionWrite {
                quotation_id,
                expected_from: transition.from,
                to: transition.to,
                actor: Some(actor.user_id),
                reason: None,
                mark_sent: true,
                now,
            })
            .await?
            .ok_or_else(|| AppError::InvalidStateTransition {
                current: "unknown".to_string(),
                event: "send".to_string(),
                reason: "status changed concurrently".to_string(),
            })?;

        let link = self
            .links
            .issue(quotation_id, recipient_email.clone(), self.link_ttl_days, now)
            .await?;

        QUOTATIONS_TOTAL.with_label_values(&["sent"]).inc();

        self.notify(Notification {
            kind: NotificationKind::QuotationSent,
            to: recipient_email,
            subject: format!("Quotation {} for your review", quotation.quotation_number),
            body: format!(
                "Quotation {} totalling {} is ready for your review: {}",
                quotation.quotation_number,
                quotation.total_amount,
                self.portal_url(quotation_id, &link.token)
            ),
        })
        .await;

        Ok((quotation, link))
    }

    /// Re-send an already-sent quotation. The status stays Sent; the
    /// rotated link plus a history entry record the resend, and sent_at
    /// restarts the reminder clock.
    #[instrument(skip(self, actor), fields(quotation_id = %quotation_id))]
    pub async fn resend(
        &self,
        quotation_id: Uuid,
        recipient_email: String,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(Quotation, AccessLink), AppError> {
        let quotation = self.fetch_authorized(quotation_id, actor).await?;
        let line_items = self.store.get_line_items(quotation_id).await?;

        let mut ctx = TransitionContext::new(quotation.valid_until, now.date_naive());
        ctx.line_item_count = line_items.len();
        ctx.approval_blocked = self.approvals.send_blocked(&quotation).await?;

        let transition = domain::apply(quotation.status(), QuotationEvent::Resend, &ctx)?;

        let quotation = self
            .store
            .transition(TransitionWrite {
                quotation_id,
                expected_from: transition.from,
                to: transition.to,
                actor: Some(actor.user_id),
                reason: Some("resent, link rotated".to_string()),
                mark_sent: true,
                now,
            })
            .await?
            .ok_or_else(|| AppError::InvalidStateTransition {
                current: "unknown".to_string(),
                event: "resend".to_string(),
                reason: "status changed concurrently".to_string(),
            })?;

        let link = self
            .links
            .issue(quotation_id, recipient_email.clone(), self.link_ttl_days, now)
            .await?;

        self.notify(Notification {
            kind: NotificationKind::QuotationSent,
            to: recipient_email,
            subject: format!("Quotation {} for your review", quotation.quotation_number),
            body: format!(
                "Quotation {} totalling {} is ready for your review: {}",
                quotation.quotation_number,
                quotation.total_amount,
                self.portal_url(quotation_id, &link.token)
            ),
        })
        .await;

        Ok((quotation, link))
    }

    /// Soft delete: the quotation moves to Cancelled, history preserved.
    #[instrument(skip(self, actor), fields(quotation_id = %quotation_id))]
    pub async fn delete(
        &self,
        quotation_id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Quotation, AppError> {
        let quotation = self.fetch_authorized(quotation_id, actor).await?;

        let ctx = TransitionContext::new(quotation.valid_until, now.date_naive());
        let transition = domain::apply(quotation.status(), QuotationEvent::Delete, &ctx)?;

        let quotation = self
            .store
            .transition(TransitionWrite {
                quotation_id,
                expected_from: transition.from,
                to: transition.to,
                actor: Some(actor.user_id),
                reason: Some("deleted by user".to_string()),
                mark_sent: false,
                now,
            })
            .await?
            .ok_or_else(|| AppError::InvalidStateTransition {
                current: "unknown".to_string(),
                event: "delete".to_string(),
                reason: "status changed concurrently".to_string(),
            })?;

        QUOTATIONS_TOTAL.with_label_values(&["cancelled"]).inc();

        info!(quotation_id = %quotation_id, "Quotation cancelled");

        Ok(quotation)
    }

    #[instrument(skip(self, actor), fields(quotation_id = %quotation_id))]
    pub async fn history(
        &self,
        quotation_id: Uuid,
        actor: &Actor,
    ) -> Result<Vec<StatusHistoryEntry>, AppError> {
        self.fetch_authorized(quotation_id, actor).await?;
        self.store.get_history(quotation_id).await
    }

    #[instrument(skip(self, actor), fields(quotation_id = %quotation_id))]
    pub async fn links(
        &self,
        quotation_id: Uuid,
        actor: &Actor,
    ) -> Result<Vec<AccessLink>, AppError> {
        self.fetch_authorized(quotation_id, actor).await?;
        self.store.get_links(quotation_id).await
    }

    async fn fetch_authorized(
        &self,
        quotation_id: Uuid,
        actor: &Actor,
    ) -> Result<Quotation, AppError> {
        let quotation = self
            .store
            .get_quotation(quotation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("quotation not found")))?;
        actor.authorize(quotation.created_by)?;
        Ok(quotation)
    }

    /// Resolve the applicable rate for the caller-supplied tax context and
    /// run the totals computation.
    async fn compute(
        &self,
        line_items: &[CreateLineItem],
        discount_percentage: rust_decimal::Decimal,
        tax: &TaxContext,
        as_of: NaiveDate,
    ) -> Result<QuotationTotals, AppError> {
        let rate = self.resolve_rate(tax, uniform_category(line_items), as_of).await?;
        Ok(domain::compute_totals(
            line_items,
            discount_percentage,
            tax.tax_exempt,
            tax.tax_zero_rated,
            rate.as_ref(),
        ))
    }

    async fn resolve_rate(
        &self,
        tax: &TaxContext,
        category_id: Option<Uuid>,
        as_of: NaiveDate,
    ) -> Result<Option<TaxRate>, AppError> {
        if tax.tax_exempt || tax.tax_zero_rated {
            return Ok(None);
        }
        let country_id = match tax.country_id {
            Some(c) => c,
            None => return Ok(None),
        };
        let framework = match self.store.get_framework_for_country(country_id).await? {
            Some(f) => f,
            None => return Ok(None),
        };

        let rates = self
            .store
            .list_rates_for_framework(framework.framework_id)
            .await?;
        let chain = match tax.jurisdiction_id {
            Some(start) => {
                let jurisdictions = self.store.list_jurisdictions(Some(country_id)).await?;
                jurisdiction_chain(start, &jurisdictions)
            }
            None => Vec::new(),
        };

        Ok(crate::domain::tax_resolver::resolve(&rates, &chain, category_id, as_of).cloned())
    }

    async fn audit_calculation(
        &self,
        quotation: &Quotation,
        totals: &QuotationTotals,
        actor: Option<Uuid>,
    ) {
        let entry = AppendAudit {
            action: "tax_calculated".to_string(),
            entity_kind: "quotation".to_string(),
            entity_id: Some(quotation.quotation_id),
            snapshot: serde_json::json!({
                "taxable_amount": totals.taxable_amount,
                "tax": totals.tax,
            }),
            actor,
        };
        if let Err(e) = self.store.append_audit(entry).await {
            error!(quotation_id = %quotation.quotation_id, error = %e, "Failed to append tax audit entry");
        }
    }

    /// Notification delivery is fire-and-forget: a failed send is logged
    /// and never fails the request that triggered it.
    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.send(notification).await {
            error!(error = %e, "Notification delivery failed");
        }
    }
}

/// The quotation-level rate lookup uses a category only when every
/// categorised line item agrees on one.
fn uniform_category(line_items: &[CreateLineItem]) -> Option<Uuid> {
    let mut categories = line_items.iter().filter_map(|i| i.category_id);
    let first = categories.next()?;
    if categories.all(|c| c == first) {
        Some(first)
    } else {
        None
    }
}

fn validate_dates(quotation_date: NaiveDate, valid_until: NaiveDate) -> Result<(), AppError> {
    if valid_until < quotation_date {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "valid_until cannot precede the quotation date"
        )));
    }
    Ok(())
}

fn validate_line_items(line_items: &[CreateLineItem]) -> Result<(), AppError> {
    use rust_decimal::Decimal;

    for item in line_items {
        if item.name.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "line item name cannot be empty"
            )));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "line item quantity must be positive"
            )));
        }
        if item.unit_rate < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "line item unit rate cannot be negative"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(category: Option<Uuid>) -> CreateLineItem {
        CreateLineItem {
            name: "widget".to_string(),
            quantity: dec!(1),
            unit_rate: dec!(10),
            category_id: category,
        }
    }

    #[test]
    fn uniform_category_requires_agreement() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(uniform_category(&[]), None);
        assert_eq!(uniform_category(&[item(None)]), None);
        assert_eq!(uniform_category(&[item(Some(a)), item(None)]), Some(a));
        assert_eq!(uniform_category(&[item(Some(a)), item(Some(a))]), Some(a));
        assert_eq!(uniform_category(&[item(Some(a)), item(Some(b))]), None);
    }
}
