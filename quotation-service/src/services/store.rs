//! Persistence boundary for quotation-service.
//!
//! The domain depends only on this trait; `PgStore` implements it over
//! PostgreSQL and `MemoryStore` implements it for deterministic tests.
//! Conditional writes (expected-status transitions, first-view
//! compare-and-set, sweep markers) are the store's responsibility so the
//! same guarantees hold under horizontal scale-out.

use crate::domain::QuotationTotals;
use crate::models::{
    AccessLink, AppendAudit, ClientResponse, Country, CreateCategory, CreateCountry,
    CreateJurisdiction, CreateLineItem, CreateTaxFramework, CreateTaxRate, Jurisdiction, LineItem,
    ProductServiceCategory, Quotation, QuotationStatus, StatusHistoryEntry, SubmitResponse,
    TaxFramework, TaxRate, ViewRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// Input for persisting a new draft quotation with its computed totals.
#[derive(Debug, Clone)]
pub struct NewQuotation {
    pub client_id: Uuid,
    pub created_by: Uuid,
    pub quotation_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub notes: Option<String>,
    pub tax_exempt: bool,
    pub tax_zero_rated: bool,
    pub totals: QuotationTotals,
    pub line_items: Vec<CreateLineItem>,
}

/// Input for replacing a draft quotation's mutable fields. All values are
/// final (the service has already validated the input and recomputed).
#[derive(Debug, Clone)]
pub struct DraftUpdate {
    pub quotation_date: NaiveDate,
    pub valid_until: NaiveDate,
    pub notes: Option<String>,
    pub tax_exempt: bool,
    pub tax_zero_rated: bool,
    pub totals: QuotationTotals,
    pub line_items: Vec<CreateLineItem>,
}

/// Input for the atomic status transition + history append.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    pub quotation_id: Uuid,
    pub expected_from: QuotationStatus,
    pub to: QuotationStatus,
    pub actor: Option<Uuid>,
    pub reason: Option<String>,
    /// Set `sent_at` as part of the same write (send/resend only).
    pub mark_sent: bool,
    pub now: DateTime<Utc>,
}

/// Input for persisting a freshly minted access link. Prior active links
/// for the quotation are deactivated in the same transaction.
#[derive(Debug, Clone)]
pub struct NewAccessLink {
    pub quotation_id: Uuid,
    pub token: String,
    pub recipient_email: String,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait QuotationStore: Send + Sync {
    // ---------------------------------------------------------------------
    // Quotations
    // ---------------------------------------------------------------------

    /// Insert the aggregate (quotation + line items + initial history
    /// entry) in one transaction, assigning the sequential number.
    async fn create_quotation(&self, input: NewQuotation) -> Result<Quotation, AppError>;

    async fn get_quotation(&self, quotation_id: Uuid) -> Result<Option<Quotation>, AppError>;

    async fn get_line_items(&self, quotation_id: Uuid) -> Result<Vec<LineItem>, AppError>;

    /// Replace the mutable fields and line items of a draft quotation.
    /// Returns `None` when the row is absent or no longer a draft.
    async fn update_draft(
        &self,
        quotation_id: Uuid,
        update: DraftUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Quotation>, AppError>;

    /// Conditional status write: updates only when the current status
    /// equals `expected_from`, appending the history entry atomically.
    /// Returns `None` when the condition no longer holds (another actor
    /// or sweep got there first).
    async fn transition(&self, write: TransitionWrite) -> Result<Option<Quotation>, AppError>;

    async fn get_history(
        &self,
        quotation_id: Uuid,
    ) -> Result<Vec<StatusHistoryEntry>, AppError>;

    // ---------------------------------------------------------------------
    // Access links
    // ---------------------------------------------------------------------

    /// Deactivate prior active links for the quotation and insert the new
    /// one, in one transaction.
    async fn create_link(&self, input: NewAccessLink) -> Result<AccessLink, AppError>;

    /// All links for a quotation, newest first.
    async fn get_links(&self, quotation_id: Uuid) -> Result<Vec<AccessLink>, AppError>;

    /// Atomically increment the view counter and set `first_viewed_at`
    /// exactly once (compare-and-set on NULL).
    async fn record_view(
        &self,
        link_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ViewRecord, AppError>;

    // ---------------------------------------------------------------------
    // Client responses
    // ---------------------------------------------------------------------

    async fn get_response(
        &self,
        quotation_id: Uuid,
    ) -> Result<Option<ClientResponse>, AppError>;

    /// Persist the response and apply the resulting status transition in
    /// one transaction. Fails with `DuplicateResponse` when a response
    /// already exists.
    async fn record_response(
        &self,
        quotation_id: Uuid,
        input: SubmitResponse,
        transition: TransitionWrite,
    ) -> Result<(ClientResponse, Quotation), AppError>;

    // ---------------------------------------------------------------------
    // Scheduler queries
    // ---------------------------------------------------------------------

    /// Quotations in Sent/Viewed whose validity window lapsed before
    /// `today`.
    async fn list_expirable(&self, today: NaiveDate) -> Result<Vec<Quotation>, AppError>;

    /// Sent quotations never viewed, sent before `cutoff`, not yet
    /// reminded.
    async fn list_due_reminders(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, AppError>;

    /// Conditional reminder marker; false when another run already set it.
    async fn mark_reminder_sent(
        &self,
        quotation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Release a claimed reminder marker after a failed delivery so the
    /// next run picks the quotation up again.
    async fn clear_reminder_marker(&self, quotation_id: Uuid) -> Result<(), AppError>;

    /// Viewed quotations first viewed before `cutoff`, with no response
    /// and no follow-up yet.
    async fn list_due_follow_ups(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, AppError>;

    /// Conditional follow-up marker; false when another run already set it.
    async fn mark_follow_up_sent(
        &self,
        quotation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Release a claimed follow-up marker after a failed delivery.
    async fn clear_follow_up_marker(&self, quotation_id: Uuid) -> Result<(), AppError>;

    /// Draft quotations last touched before `cutoff`. The escalation sweep
    /// filters these through the approval gateway.
    async fn list_stale_drafts(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<Quotation>, AppError>;

    // ---------------------------------------------------------------------
    // Tax configuration
    // ---------------------------------------------------------------------

    async fn create_country(&self, input: CreateCountry) -> Result<Country, AppError>;
    async fn list_countries(&self) -> Result<Vec<Country>, AppError>;

    async fn create_framework(
        &self,
        input: CreateTaxFramework,
    ) -> Result<TaxFramework, AppError>;
    async fn get_framework(
        &self,
        framework_id: Uuid,
    ) -> Result<Option<TaxFramework>, AppError>;
    async fn get_framework_for_country(
        &self,
        country_id: Uuid,
    ) -> Result<Option<TaxFramework>, AppError>;

    async fn create_jurisdiction(
        &self,
        input: CreateJurisdiction,
    ) -> Result<Jurisdiction, AppError>;
    async fn list_jurisdictions(
        &self,
        country_id: Option<Uuid>,
    ) -> Result<Vec<Jurisdiction>, AppError>;

    async fn create_category(
        &self,
        input: CreateCategory,
    ) -> Result<ProductServiceCategory, AppError>;
    async fn list_categories(&self) -> Result<Vec<ProductServiceCategory>, AppError>;

    async fn create_tax_rate(&self, input: CreateTaxRate) -> Result<TaxRate, AppError>;
    async fn get_tax_rate(&self, tax_rate_id: Uuid) -> Result<Option<TaxRate>, AppError>;
    /// All rates of a framework; the resolver filters by tuple and date.
    async fn list_rates_for_framework(
        &self,
        framework_id: Uuid,
    ) -> Result<Vec<TaxRate>, AppError>;

    // ---------------------------------------------------------------------
    // Audit
    // ---------------------------------------------------------------------

    /// Append-only; the core never reads, mutates or deletes entries.
    async fn append_audit(&self, entry: AppendAudit) -> Result<(), AppError>;
}

/// Shared discount validation used by create and update paths.
pub fn validate_discount(discount_percentage: Decimal) -> Result<(), AppError> {
    if discount_percentage < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "discount percentage cannot be negative"
        )));
    }
    Ok(())
}
