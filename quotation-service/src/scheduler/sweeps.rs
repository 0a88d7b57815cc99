//! Lifecycle sweeps.
//!
//! Each sweep takes `now` explicitly so tests drive time, and re-checks its
//! guard inside a conditional store write so overlapping runs (two service
//! instances, or a slow run lapping itself) never double-process a row.
//! Per-item failures are logged and skipped; the sweep keeps going.

use crate::domain::{self, QuotationEvent, TransitionContext};
use crate::models::Quotation;
use crate::services::approvals::ApprovalGateway;
use crate::services::notifier::{Notification, NotificationKind, Notifier};
use crate::services::store::{QuotationStore, TransitionWrite};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, instrument};

/// How often a sweep fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Once a day at the given UTC hour.
    Daily { at_hour: u32 },
    /// At the top of every hour.
    Hourly,
}

/// What one run accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub matched: usize,
    pub processed: usize,
    pub failed: usize,
}

/// A sweep-level failure, classified for the runner's backoff decision.
#[derive(Debug)]
pub enum SweepError {
    /// Wait for the next natural fire.
    Transient(AppError),
    /// Back the job off for an extended interval.
    Unrecoverable(AppError),
}

impl std::fmt::Display for SweepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepError::Transient(e) => write!(f, "transient: {}", e),
            SweepError::Unrecoverable(e) => write!(f, "unrecoverable: {}", e),
        }
    }
}

/// The list query is the sweep's foundation; when it fails with anything
/// other than a plain database error, the schema or configuration is
/// broken and retrying on cadence will not help.
fn classify(err: AppError) -> SweepError {
    match err {
        AppError::DatabaseError(_) => SweepError::Transient(err),
        other => SweepError::Unrecoverable(other),
    }
}

#[async_trait]
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;
    fn cadence(&self) -> Cadence;
    async fn run(&self, now: DateTime<Utc>) -> Result<SweepOutcome, SweepError>;
}

/// Sent/Viewed quotations whose validity window has lapsed move to
/// Expired with a system (actor-less) history entry.
pub struct ExpirationSweep {
    store: Arc<dyn QuotationStore>,
    at_hour: u32,
}

impl ExpirationSweep {
    pub fn new(store: Arc<dyn QuotationStore>, at_hour: u32) -> Self {
        Self { store, at_hour }
    }
}

#[async_trait]
impl Sweep for ExpirationSweep {
    fn name(&self) -> &'static str {
        "expiration"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily {
            at_hour: self.at_hour,
        }
    }

    #[instrument(skip(self), fields(sweep = self.name()))]
    async fn run(&self, now: DateTime<Utc>) -> Result<SweepOutcome, SweepError> {
        let today = now.date_naive();
        let candidates = self.store.list_expirable(today).await.map_err(classify)?;

        let mut outcome = SweepOutcome {
            matched: candidates.len(),
            ..SweepOutcome::default()
        };

        for quotation in candidates {
            match self.expire_one(&quotation, now).await {
                Ok(true) => outcome.processed += 1,
                // Lost the conditional write to a concurrent transition.
                Ok(false) => {}
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        quotation_id = %quotation.quotation_id,
                        error = %e,
                        "Failed to expire quotation"
                    );
                }
            }
        }

        Ok(outcome)
    }
}

impl ExpirationSweep {
    async fn expire_one(
        &self,
        quotation: &Quotation,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let ctx = TransitionContext::new(quotation.valid_until, now.date_naive());
        let transition = domain::apply(quotation.status(), QuotationEvent::AutoExpire, &ctx)?;

        let written = self
            .store
            .transition(TransitionWrite {
                quotation_id: quotation.quotation_id,
                expected_from: transition.from,
                to: transition.to,
                actor: None,
                reason: Some("validity window lapsed".to_string()),
                mark_sent: false,
                now,
            })
            .await?;

        Ok(written.is_some())
    }
}

/// Sent quotations never viewed after a threshold get one reminder email;
/// `last_reminder_at` makes the sweep fire once per quotation.
pub struct UnviewedReminderSweep {
    store: Arc<dyn QuotationStore>,
    notifier: Arc<dyn Notifier>,
    threshold_days: i64,
    at_hour: u32,
}

impl UnviewedReminderSweep {
    pub fn new(
        store: Arc<dyn QuotationStore>,
        notifier: Arc<dyn Notifier>,
        threshold_days: i64,
        at_hour: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            threshold_days,
            at_hour,
        }
    }

    async fn remind_one(
        &self,
        quotation: &Quotation,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Marker first: if a concurrent run already claimed it, skip.
        if !self
            .store
            .mark_reminder_sent(quotation.quotation_id, now)
            .await?
        {
            return Ok(false);
        }

        match self.deliver(quotation).await {
            Ok(()) => Ok(true),
            Err(err) => {
                // Release the claim so the next run retries the delivery.
                self.store
                    .clear_reminder_marker(quotation.quotation_id)
                    .await?;
                Err(err)
            }
        }
    }

    async fn deliver(&self, quotation: &Quotation) -> Result<(), AppError> {
        if let Some(recipient) = active_recipient(&*self.store, quotation).await? {
            self.notifier
                .send(Notification {
                    kind: NotificationKind::Reminder,
                    to: recipient,
                    subject: format!(
                        "Reminder: quotation {} is awaiting your review",
                        quotation.quotation_number
                    ),
                    body: format!(
                        "Quotation {} is valid until {}.",
                        quotation.quotation_number, quotation.valid_until
                    ),
                })
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Sweep for UnviewedReminderSweep {
    fn name(&self) -> &'static str {
        "unviewed_reminder"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily {
            at_hour: self.at_hour,
        }
    }

    #[instrument(skip(self), fields(sweep = self.name()))]
    async fn run(&self, now: DateTime<Utc>) -> Result<SweepOutcome, SweepError> {
        let cutoff = now - Duration::days(self.threshold_days);
        let candidates = self
            .store
            .list_due_reminders(cutoff)
            .await
            .map_err(classify)?;

        let mut outcome = SweepOutcome {
            matched: candidates.len(),
            ..SweepOutcome::default()
        };

        for quotation in candidates {
            match self.remind_one(&quotation, now).await {
                Ok(true) => outcome.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        quotation_id = %quotation.quotation_id,
                        error = %e,
                        "Failed to send reminder"
                    );
                }
            }
        }

        Ok(outcome)
    }
}

/// Viewed quotations with no response after a threshold get one follow-up;
/// `last_follow_up_at` is the idempotence marker.
pub struct PendingResponseFollowUpSweep {
    store: Arc<dyn QuotationStore>,
    notifier: Arc<dyn Notifier>,
    threshold_days: i64,
    at_hour: u32,
}

impl PendingResponseFollowUpSweep {
    pub fn new(
        store: Arc<dyn QuotationStore>,
        notifier: Arc<dyn Notifier>,
        threshold_days: i64,
        at_hour: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            threshold_days,
            at_hour,
        }
    }

    async fn follow_up_one(
        &self,
        quotation: &Quotation,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if !self
            .store
            .mark_follow_up_sent(quotation.quotation_id, now)
            .await?
        {
            return Ok(false);
        }

        match self.deliver(quotation).await {
            Ok(()) => Ok(true),
            Err(err) => {
                // Release the claim so the next run retries the delivery.
                self.store
                    .clear_follow_up_marker(quotation.quotation_id)
                    .await?;
                Err(err)
            }
        }
    }

    async fn deliver(&self, quotation: &Quotation) -> Result<(), AppError> {
        if let Some(recipient) = active_recipient(&*self.store, quotation).await? {
            self.notifier
                .send(Notification {
                    kind: NotificationKind::FollowUp,
                    to: recipient,
                    subject: format!(
                        "Following up on quotation {}",
                        quotation.quotation_number
                    ),
                    body: format!(
                        "You viewed quotation {} but have not responded yet. It is valid until {}.",
                        quotation.quotation_number, quotation.valid_until
                    ),
                })
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Sweep for PendingResponseFollowUpSweep {
    fn name(&self) -> &'static str {
        "pending_response_follow_up"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily {
            at_hour: self.at_hour,
        }
    }

    #[instrument(skip(self), fields(sweep = self.name()))]
    async fn run(&self, now: DateTime<Utc>) -> Result<SweepOutcome, SweepError> {
        let cutoff = now - Duration::days(self.threshold_days);
        let candidates = self
            .store
            .list_due_follow_ups(cutoff)
            .await
            .map_err(classify)?;

        let mut outcome = SweepOutcome {
            matched: candidates.len(),
            ..SweepOutcome::default()
        };

        for quotation in candidates {
            match self.follow_up_one(&quotation, now).await {
                Ok(true) => outcome.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        quotation_id = %quotation.quotation_id,
                        error = %e,
                        "Failed to send follow-up"
                    );
                }
            }
        }

        Ok(outcome)
    }
}

/// Drafts blocked on a pending discount approval past a threshold are
/// escalated to the external approval collaborator.
pub struct ApprovalEscalationSweep {
    store: Arc<dyn QuotationStore>,
    approvals: Arc<dyn ApprovalGateway>,
    threshold_hours: i64,
}

impl ApprovalEscalationSweep {
    pub fn new(
        store: Arc<dyn QuotationStore>,
        approvals: Arc<dyn ApprovalGateway>,
        threshold_hours: i64,
    ) -> Self {
        Self {
            store,
            approvals,
            threshold_hours,
        }
    }
}

#[async_trait]
impl Sweep for ApprovalEscalationSweep {
    fn name(&self) -> &'static str {
        "approval_escalation"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Hourly
    }

    #[instrument(skip(self), fields(sweep = self.name()))]
    async fn run(&self, now: DateTime<Utc>) -> Result<SweepOutcome, SweepError> {
        let cutoff = now - Duration::hours(self.threshold_hours);
        let drafts = self.store.list_stale_drafts(cutoff).await.map_err(classify)?;

        let mut outcome = SweepOutcome::default();

        for quotation in drafts {
            let blocked = match self.approvals.send_blocked(&quotation).await {
                Ok(b) => b,
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        quotation_id = %quotation.quotation_id,
                        error = %e,
                        "Approval check failed during escalation sweep"
                    );
                    continue;
                }
            };
            if !blocked {
                continue;
            }

            outcome.matched += 1;
            match self.approvals.escalate(&quotation).await {
                Ok(()) => outcome.processed += 1,
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        quotation_id = %quotation.quotation_id,
                        error = %e,
                        "Escalation failed"
                    );
                }
            }
        }

        Ok(outcome)
    }
}

/// The active link's recipient is the notification target; a quotation
/// with no active link gets its marker set but no email.
async fn active_recipient(
    store: &dyn QuotationStore,
    quotation: &Quotation,
) -> Result<Option<String>, AppError> {
    let links = store.get_links(quotation.quotation_id).await?;
    Ok(links
        .into_iter()
        .find(|l| l.is_active)
        .map(|l| l.recipient_email))
}
