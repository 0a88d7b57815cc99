//! PostgreSQL `QuotationStore` implementation for quotation-service.
//!
//! Conditional writes carry their guard in the SQL (`WHERE status = …`,
//! `WHERE last_reminder_at IS NULL`) so concurrent service instances and
//! overlapping sweep runs cannot double-process a row.

use crate::models::{
    AccessLink, AppendAudit, ClientResponse, Country, CreateCategory, CreateCountry,
    CreateJurisdiction, CreateTaxFramework, CreateTaxRate, Jurisdiction, LineItem,
    ProductServiceCategory, Quotation, QuotationStatus, StatusHistoryEntry, SubmitResponse,
    TaxFramework, TaxRate, TaxRateRow, ViewRecord,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    DraftUpdate, NewAccessLink, NewQuotation, QuotationStore, TransitionWrite,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const QUOTATION_COLUMNS: &str = "quotation_id, quotation_number, client_id, created_by, status, \
     quotation_date, valid_until, sub_total, discount_percentage, discount_amount, \
     taxable_amount, total_tax, total_amount, tax_exempt, tax_zero_rated, tax_breakdown, \
     notes, sent_at, last_reminder_at, last_follow_up_at, created_utc, updated_utc";

const LINK_COLUMNS: &str = "link_id, quotation_id, token, recipient_email, is_active, \
     expires_at, sent_at, first_viewed_at, view_count, created_utc";

fn breakdown_json(totals: &crate::domain::QuotationTotals) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(&totals.tax).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to serialize tax breakdown: {}", e))
    })
}

const RATE_COLUMNS: &str = "tax_rate_id, framework_id, jurisdiction_id, category_id, name, \
     rate, is_exempt, is_zero_rated, effective_from, effective_to, components, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "quotation-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn insert_line_items(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        quotation_id: Uuid,
        items: &[crate::models::CreateLineItem],
    ) -> Result<(), AppError> {
        for (i, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO line_items (line_item_id, quotation_id, sort_order, name, quantity, unit_rate, amount, category_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(quotation_id)
            .bind(i as i32)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_rate)
            .bind(item.amount())
            .bind(item.category_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert line item: {}", e))
            })?;
        }
        Ok(())
    }

    async fn insert_history(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        quotation_id: Uuid,
        previous: Option<&str>,
        new_status: &str,
        actor: Option<Uuid>,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO status_history (entry_id, quotation_id, previous_status, new_status, actor, reason, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quotation_id)
        .bind(previous)
        .bind(new_status)
        .bind(actor)
        .bind(reason)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert history entry: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl QuotationStore for PgStore {
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    async fn create_quotation(&self, input: NewQuotation) -> Result<Quotation, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_quotation"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quotation_id = Uuid::new_v4();
        let now = Utc::now();
        let quotation = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            INSERT INTO quotations (
                quotation_id, quotation_number, client_id, created_by, status,
                quotation_date, valid_until, sub_total, discount_percentage, discount_amount,
                taxable_amount, total_tax, total_amount, tax_exempt, tax_zero_rated,
                tax_breakdown, notes, created_utc, updated_utc
            )
            VALUES ($1, next_quotation_number(), $2, $3, 'draft', $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            RETURNING {QUOTATION_COLUMNS}
            "#,
        ))
        .bind(quotation_id)
        .bind(input.client_id)
        .bind(input.created_by)
        .bind(input.quotation_date)
        .bind(input.valid_until)
        .bind(input.totals.sub_total)
        .bind(input.totals.discount_percentage)
        .bind(input.totals.discount_amount)
        .bind(input.totals.taxable_amount)
        .bind(input.totals.tax.total_tax)
        .bind(input.totals.total_amount)
        .bind(input.tax_exempt)
        .bind(input.tax_zero_rated)
        .bind(breakdown_json(&input.totals)?)
        .bind(&input.notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create quotation: {}", e))
        })?;

        Self::insert_line_items(&mut tx, quotation_id, &input.line_items).await?;
        Self::insert_history(
            &mut tx,
            quotation_id,
            None,
            QuotationStatus::Draft.as_str(),
            Some(input.created_by),
            None,
            now,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            quotation_id = %quotation.quotation_id,
            quotation_number = %quotation.quotation_number,
            "Draft quotation created"
        );

        Ok(quotation)
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn get_quotation(&self, quotation_id: Uuid) -> Result<Option<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_quotation"])
            .start_timer();

        let quotation = sqlx::query_as::<_, Quotation>(&format!(
            "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE quotation_id = $1",
        ))
        .bind(quotation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get quotation: {}", e)))?;

        timer.observe_duration();

        Ok(quotation)
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn get_line_items(&self, quotation_id: Uuid) -> Result<Vec<LineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_line_items"])
            .start_timer();

        let items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT line_item_id, quotation_id, sort_order, name, quantity, unit_rate, amount, category_id, created_utc
            FROM line_items
            WHERE quotation_id = $1
            ORDER BY sort_order
            "#,
        )
        .bind(quotation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get line items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    #[instrument(skip(self, update), fields(quotation_id = %quotation_id))]
    async fn update_draft(
        &self,
        quotation_id: Uuid,
        update: DraftUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_draft"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quotation = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            UPDATE quotations
            SET quotation_date = $2,
                valid_until = $3,
                notes = $4,
                tax_exempt = $5,
                tax_zero_rated = $6,
                sub_total = $7,
                discount_percentage = $8,
                discount_amount = $9,
                taxable_amount = $10,
                total_tax = $11,
                total_amount = $12,
                tax_breakdown = $13,
                updated_utc = $14
            WHERE quotation_id = $1 AND status = 'draft'
            RETURNING {QUOTATION_COLUMNS}
            "#,
        ))
        .bind(quotation_id)
        .bind(update.quotation_date)
        .bind(update.valid_until)
        .bind(&update.notes)
        .bind(update.tax_exempt)
        .bind(update.tax_zero_rated)
        .bind(update.totals.sub_total)
        .bind(update.totals.discount_percentage)
        .bind(update.totals.discount_amount)
        .bind(update.totals.taxable_amount)
        .bind(update.totals.tax.total_tax)
        .bind(update.totals.total_amount)
        .bind(breakdown_json(&update.totals)?)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update quotation: {}", e))
        })?;

        let quotation = match quotation {
            Some(q) => q,
            None => return Ok(None),
        };

        sqlx::query("DELETE FROM line_items WHERE quotation_id = $1")
            .bind(quotation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to clear line items: {}", e))
            })?;

        Self::insert_line_items(&mut tx, quotation_id, &update.line_items).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(quotation_id = %quotation_id, "Draft quotation updated");

        Ok(Some(quotation))
    }

    #[instrument(skip(self, write), fields(quotation_id = %write.quotation_id))]
    async fn transition(&self, write: TransitionWrite) -> Result<Option<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let quotation = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            UPDATE quotations
            SET status = $3,
                sent_at = CASE WHEN $4 THEN $5 ELSE sent_at END,
                updated_utc = $5
            WHERE quotation_id = $1 AND status = $2
            RETURNING {QUOTATION_COLUMNS}
            "#,
        ))
        .bind(write.quotation_id)
        .bind(write.expected_from.as_str())
        .bind(write.to.as_str())
        .bind(write.mark_sent)
        .bind(write.now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to transition quotation: {}", e))
        })?;

        let quotation = match quotation {
            Some(q) => q,
            None => return Ok(None),
        };

        Self::insert_history(
            &mut tx,
            write.quotation_id,
            Some(write.expected_from.as_str()),
            write.to.as_str(),
            write.actor,
            write.reason.as_deref(),
            write.now,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            quotation_id = %write.quotation_id,
            from = write.expected_from.as_str(),
            to = write.to.as_str(),
            "Quotation status transitioned"
        );

        Ok(Some(quotation))
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn get_history(
        &self,
        quotation_id: Uuid,
    ) -> Result<Vec<StatusHistoryEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_history"])
            .start_timer();

        let entries = sqlx::query_as::<_, StatusHistoryEntry>(
            r#"
            SELECT entry_id, quotation_id, previous_status, new_status, actor, reason, created_utc
            FROM status_history
            WHERE quotation_id = $1
            ORDER BY created_utc, entry_id
            "#,
        )
        .bind(quotation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get history: {}", e)))?;

        timer.observe_duration();

        Ok(entries)
    }

    #[instrument(skip(self, input), fields(quotation_id = %input.quotation_id))]
    async fn create_link(&self, input: NewAccessLink) -> Result<AccessLink, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_link"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query(
            "UPDATE access_links SET is_active = FALSE WHERE quotation_id = $1 AND is_active",
        )
        .bind(input.quotation_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate prior links: {}", e))
        })?;

        let link = sqlx::query_as::<_, AccessLink>(&format!(
            r#"
            INSERT INTO access_links (link_id, quotation_id, token, recipient_email, is_active, expires_at, sent_at, view_count, created_utc)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6, 0, $6)
            RETURNING {LINK_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.quotation_id)
        .bind(&input.token)
        .bind(&input.recipient_email)
        .bind(input.expires_at)
        .bind(input.sent_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create link: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(quotation_id = %input.quotation_id, link_id = %link.link_id, "Access link issued");

        Ok(link)
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn get_links(&self, quotation_id: Uuid) -> Result<Vec<AccessLink>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_links"])
            .start_timer();

        let links = sqlx::query_as::<_, AccessLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM access_links WHERE quotation_id = $1 ORDER BY created_utc DESC",
        ))
        .bind(quotation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get links: {}", e)))?;

        timer.observe_duration();

        Ok(links)
    }

    #[instrument(skip(self), fields(link_id = %link_id))]
    async fn record_view(
        &self,
        link_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ViewRecord, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_view"])
            .start_timer();

        // COALESCE keeps the original first-view timestamp under
        // concurrent hits; the counter increment is atomic in the row
        // update itself.
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE access_links
            SET view_count = view_count + 1,
                first_viewed_at = COALESCE(first_viewed_at, $2)
            WHERE link_id = $1
            RETURNING view_count
            "#,
        )
        .bind(link_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record view: {}", e)))?;

        timer.observe_duration();

        let (view_count,) = row.ok_or(AppError::LinkNotFound)?;

        Ok(ViewRecord {
            first_view: view_count == 1,
            view_count,
        })
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn get_response(
        &self,
        quotation_id: Uuid,
    ) -> Result<Option<ClientResponse>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_response"])
            .start_timer();

        let response = sqlx::query_as::<_, ClientResponse>(
            r#"
            SELECT response_id, quotation_id, response_type, respondent_name, respondent_email, message, origin_ip, created_utc
            FROM client_responses
            WHERE quotation_id = $1
            "#,
        )
        .bind(quotation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get response: {}", e)))?;

        timer.observe_duration();

        Ok(response)
    }

    #[instrument(skip(self, input, transition), fields(quotation_id = %quotation_id))]
    async fn record_response(
        &self,
        quotation_id: Uuid,
        input: SubmitResponse,
        transition: TransitionWrite,
    ) -> Result<(ClientResponse, Quotation), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_response"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let response = sqlx::query_as::<_, ClientResponse>(
            r#"
            INSERT INTO client_responses (response_id, quotation_id, response_type, respondent_name, respondent_email, message, origin_ip, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING response_id, quotation_id, response_type, respondent_name, respondent_email, message, origin_ip, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(quotation_id)
        .bind(input.response_type.as_str())
        .bind(&input.respondent_name)
        .bind(&input.respondent_email)
        .bind(&input.message)
        .bind(&input.origin_ip)
        .bind(transition.now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateResponse
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert response: {}", e)),
        })?;

        let quotation = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            UPDATE quotations
            SET status = $3, updated_utc = $4
            WHERE quotation_id = $1 AND status = $2
            RETURNING {QUOTATION_COLUMNS}
            "#,
        ))
        .bind(quotation_id)
        .bind(transition.expected_from.as_str())
        .bind(transition.to.as_str())
        .bind(transition.now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to transition quotation: {}", e))
        })?;

        let quotation = quotation.ok_or_else(|| AppError::InvalidStateTransition {
            current: "unknown".to_string(),
            event: "client_respond".to_string(),
            reason: "status changed concurrently".to_string(),
        })?;

        Self::insert_history(
            &mut tx,
            quotation_id,
            Some(transition.expected_from.as_str()),
            transition.to.as_str(),
            transition.actor,
            transition.reason.as_deref(),
            transition.now,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            quotation_id = %quotation_id,
            response_type = input.response_type.as_str(),
            "Client response recorded"
        );

        Ok((response, quotation))
    }

    #[instrument(skip(self))]
    async fn list_expirable(&self, today: NaiveDate) -> Result<Vec<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_expirable"])
            .start_timer();

        let quotations = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            SELECT {QUOTATION_COLUMNS}
            FROM quotations
            WHERE status IN ('sent', 'viewed') AND valid_until < $1
            ORDER BY valid_until
            "#,
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list expirable quotations: {}", e))
        })?;

        timer.observe_duration();

        Ok(quotations)
    }

    #[instrument(skip(self))]
    async fn list_due_reminders(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_due_reminders"])
            .start_timer();

        let quotations = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            SELECT {QUOTATION_COLUMNS}
            FROM quotations
            WHERE status = 'sent'
              AND last_reminder_at IS NULL
              AND sent_at < $1
            ORDER BY sent_at
            "#,
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list due reminders: {}", e))
        })?;

        timer.observe_duration();

        Ok(quotations)
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn mark_reminder_sent(
        &self,
        quotation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE quotations
            SET last_reminder_at = $2
            WHERE quotation_id = $1 AND status = 'sent' AND last_reminder_at IS NULL
            "#,
        )
        .bind(quotation_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark reminder sent: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn clear_reminder_marker(&self, quotation_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE quotations SET last_reminder_at = NULL WHERE quotation_id = $1")
            .bind(quotation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to clear reminder marker: {}", e))
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_due_follow_ups(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_due_follow_ups"])
            .start_timer();

        let quotations = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            SELECT {QUOTATION_COLUMNS}
            FROM quotations q
            WHERE q.status = 'viewed'
              AND q.last_follow_up_at IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM client_responses r WHERE r.quotation_id = q.quotation_id
              )
              AND EXISTS (
                  SELECT 1 FROM access_links l
                  WHERE l.quotation_id = q.quotation_id AND l.first_viewed_at < $1
              )
            ORDER BY q.updated_utc
            "#,
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list due follow-ups: {}", e))
        })?;

        timer.observe_duration();

        Ok(quotations)
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn mark_follow_up_sent(
        &self,
        quotation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE quotations
            SET last_follow_up_at = $2
            WHERE quotation_id = $1 AND status = 'viewed' AND last_follow_up_at IS NULL
            "#,
        )
        .bind(quotation_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark follow-up sent: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(quotation_id = %quotation_id))]
    async fn clear_follow_up_marker(&self, quotation_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE quotations SET last_follow_up_at = NULL WHERE quotation_id = $1")
            .bind(quotation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to clear follow-up marker: {}", e))
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_stale_drafts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, AppError> {
        let quotations = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            SELECT {QUOTATION_COLUMNS}
            FROM quotations
            WHERE status = 'draft' AND updated_utc < $1
            ORDER BY updated_utc
            "#,
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list stale drafts: {}", e))
        })?;

        Ok(quotations)
    }

    #[instrument(skip(self, input))]
    async fn create_country(&self, input: CreateCountry) -> Result<Country, AppError> {
        let country = sqlx::query_as::<_, Country>(
            r#"
            INSERT INTO countries (country_id, code, name, created_utc)
            VALUES ($1, $2, $3, NOW())
            RETURNING country_id, code, name, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.code)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::ConfigurationConflict(anyhow::anyhow!(
                    "country '{}' ({}) already exists",
                    input.name,
                    input.code
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create country: {}", e)),
        })?;

        info!(country_id = %country.country_id, code = %country.code, "Country created");

        Ok(country)
    }

    #[instrument(skip(self))]
    async fn list_countries(&self) -> Result<Vec<Country>, AppError> {
        let countries = sqlx::query_as::<_, Country>(
            "SELECT country_id, code, name, created_utc FROM countries ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list countries: {}", e)))?;

        Ok(countries)
    }

    #[instrument(skip(self, input), fields(country_id = %input.country_id))]
    async fn create_framework(
        &self,
        input: CreateTaxFramework,
    ) -> Result<TaxFramework, AppError> {
        let framework = sqlx::query_as::<_, TaxFramework>(
            r#"
            INSERT INTO tax_frameworks (framework_id, country_id, name, component_names, created_utc)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING framework_id, country_id, name, component_names, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.country_id)
        .bind(&input.name)
        .bind(serde_json::json!(input.component_names))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::ConfigurationConflict(anyhow::anyhow!(
                    "country already has a tax framework"
                ))
            }
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("country not found"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create framework: {}", e)),
        })?;

        info!(framework_id = %framework.framework_id, "Tax framework created");

        Ok(framework)
    }

    #[instrument(skip(self), fields(framework_id = %framework_id))]
    async fn get_framework(
        &self,
        framework_id: Uuid,
    ) -> Result<Option<TaxFramework>, AppError> {
        let framework = sqlx::query_as::<_, TaxFramework>(
            r#"
            SELECT framework_id, country_id, name, component_names, created_utc
            FROM tax_frameworks
            WHERE framework_id = $1
            "#,
        )
        .bind(framework_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get framework: {}", e)))?;

        Ok(framework)
    }

    #[instrument(skip(self), fields(country_id = %country_id))]
    async fn get_framework_for_country(
        &self,
        country_id: Uuid,
    ) -> Result<Option<TaxFramework>, AppError> {
        let framework = sqlx::query_as::<_, TaxFramework>(
            r#"
            SELECT framework_id, country_id, name, component_names, created_utc
            FROM tax_frameworks
            WHERE country_id = $1
            "#,
        )
        .bind(country_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get framework: {}", e)))?;

        Ok(framework)
    }

    #[instrument(skip(self, input), fields(country_id = %input.country_id))]
    async fn create_jurisdiction(
        &self,
        input: CreateJurisdiction,
    ) -> Result<Jurisdiction, AppError> {
        let jurisdiction = sqlx::query_as::<_, Jurisdiction>(
            r#"
            INSERT INTO jurisdictions (jurisdiction_id, country_id, parent_id, name, created_utc)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING jurisdiction_id, country_id, parent_id, name, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.country_id)
        .bind(input.parent_id)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("country or parent jurisdiction not found"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create jurisdiction: {}", e)),
        })?;

        info!(jurisdiction_id = %jurisdiction.jurisdiction_id, "Jurisdiction created");

        Ok(jurisdiction)
    }

    #[instrument(skip(self))]
    async fn list_jurisdictions(
        &self,
        country_id: Option<Uuid>,
    ) -> Result<Vec<Jurisdiction>, AppError> {
        let jurisdictions = sqlx::query_as::<_, Jurisdiction>(
            r#"
            SELECT jurisdiction_id, country_id, parent_id, name, created_utc
            FROM jurisdictions
            WHERE ($1::uuid IS NULL OR country_id = $1)
            ORDER BY name
            "#,
        )
        .bind(country_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list jurisdictions: {}", e))
        })?;

        Ok(jurisdictions)
    }

    #[instrument(skip(self, input))]
    async fn create_category(
        &self,
        input: CreateCategory,
    ) -> Result<ProductServiceCategory, AppError> {
        let category = sqlx::query_as::<_, ProductServiceCategory>(
            r#"
            INSERT INTO categories (category_id, name, description, created_utc)
            VALUES ($1, $2, $3, NOW())
            RETURNING category_id, name, description, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::ConfigurationConflict(anyhow::anyhow!(
                    "category '{}' already exists",
                    input.name
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create category: {}", e)),
        })?;

        Ok(category)
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<ProductServiceCategory>, AppError> {
        let categories = sqlx::query_as::<_, ProductServiceCategory>(
            "SELECT category_id, name, description, created_utc FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list categories: {}", e))
        })?;

        Ok(categories)
    }

    #[instrument(skip(self, input), fields(framework_id = %input.framework_id))]
    async fn create_tax_rate(&self, input: CreateTaxRate) -> Result<TaxRate, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_tax_rate"])
            .start_timer();

        let row = sqlx::query_as::<_, TaxRateRow>(&format!(
            r#"
            INSERT INTO tax_rates (tax_rate_id, framework_id, jurisdiction_id, category_id, name, rate, is_exempt, is_zero_rated, effective_from, effective_to, components, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            RETURNING {RATE_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.framework_id)
        .bind(input.jurisdiction_id)
        .bind(input.category_id)
        .bind(&input.name)
        .bind(input.rate)
        .bind(input.is_exempt)
        .bind(input.is_zero_rated)
        .bind(input.effective_from)
        .bind(input.effective_to)
        .bind(serde_json::to_value(&input.components).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to serialize components: {}", e))
        })?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("framework, jurisdiction or category not found"))
            }
            // 23P01: the exclusion constraint caught an interval overlap
            // that raced past the service-level validation.
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("23P01") => {
                AppError::ConfigurationConflict(anyhow::anyhow!(
                    "tax rate interval overlaps an existing rate for this jurisdiction/category"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create tax rate: {}", e)),
        })?;

        timer.observe_duration();

        let rate = row.into_tax_rate().map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to decode components: {}", e))
        })?;

        info!(tax_rate_id = %rate.tax_rate_id, name = %rate.name, "Tax rate created");

        Ok(rate)
    }

    #[instrument(skip(self), fields(tax_rate_id = %tax_rate_id))]
    async fn get_tax_rate(&self, tax_rate_id: Uuid) -> Result<Option<TaxRate>, AppError> {
        let row = sqlx::query_as::<_, TaxRateRow>(&format!(
            "SELECT {RATE_COLUMNS} FROM tax_rates WHERE tax_rate_id = $1",
        ))
        .bind(tax_rate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get tax rate: {}", e)))?;

        row.map(|r| {
            r.into_tax_rate().map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Failed to decode components: {}", e))
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(framework_id = %framework_id))]
    async fn list_rates_for_framework(
        &self,
        framework_id: Uuid,
    ) -> Result<Vec<TaxRate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_rates_for_framework"])
            .start_timer();

        let rows = sqlx::query_as::<_, TaxRateRow>(&format!(
            "SELECT {RATE_COLUMNS} FROM tax_rates WHERE framework_id = $1 ORDER BY effective_from",
        ))
        .bind(framework_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list tax rates: {}", e)))?;

        timer.observe_duration();

        rows.into_iter()
            .map(|r| {
                r.into_tax_rate().map_err(|e| {
                    AppError::InternalError(anyhow::anyhow!("Failed to decode components: {}", e))
                })
            })
            .collect()
    }

    #[instrument(skip(self, entry))]
    async fn append_audit(&self, entry: AppendAudit) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO tax_config_audit (audit_id, action, entity_kind, entity_id, snapshot, actor, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.action)
        .bind(&entry.entity_kind)
        .bind(entry.entity_id)
        .bind(&entry.snapshot)
        .bind(entry.actor)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to append audit: {}", e)))?;

        Ok(())
    }
}
