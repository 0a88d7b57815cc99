//! In-memory `QuotationStore` used by tests and local development.
//!
//! Mirrors the transactional guarantees of `PgStore` under a single
//! `RwLock`: conditional transitions, the first-view compare-and-set and
//! the sweep markers all re-check their condition under the write lock.

use crate::domain::tax_resolver::validate_no_overlap;
use crate::services::store::{
    DraftUpdate, NewAccessLink, NewQuotation, QuotationStore, TransitionWrite,
};
use crate::models::{
    AccessLink, AppendAudit, ClientResponse, Country, CreateCategory, CreateCountry,
    CreateJurisdiction, CreateTaxFramework, CreateTaxRate, Jurisdiction, LineItem,
    ProductServiceCategory, Quotation, StatusHistoryEntry, SubmitResponse, TaxConfigAudit,
    TaxFramework, TaxRate, ViewRecord,
};
use crate::models::QuotationStatus;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    quotations: HashMap<Uuid, Quotation>,
    line_items: HashMap<Uuid, Vec<LineItem>>,
    history: HashMap<Uuid, Vec<StatusHistoryEntry>>,
    links: HashMap<Uuid, AccessLink>,
    responses: HashMap<Uuid, ClientResponse>,
    countries: Vec<Country>,
    frameworks: Vec<TaxFramework>,
    jurisdictions: Vec<Jurisdiction>,
    categories: Vec<ProductServiceCategory>,
    tax_rates: Vec<TaxRate>,
    audit: Vec<TaxConfigAudit>,
    quotation_seq: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit entries recorded so far (test inspection only).
    pub async fn audit_entries(&self) -> Vec<TaxConfigAudit> {
        self.inner.read().await.audit.clone()
    }
}

fn line_items_from_create(
    quotation_id: Uuid,
    items: &[crate::models::CreateLineItem],
    now: DateTime<Utc>,
) -> Vec<LineItem> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| LineItem {
            line_item_id: Uuid::new_v4(),
            quotation_id,
            sort_order: i as i32,
            name: item.name.clone(),
            quantity: item.quantity,
            unit_rate: item.unit_rate,
            amount: item.amount(),
            category_id: item.category_id,
            created_utc: now,
        })
        .collect()
}

fn apply_transition(
    inner: &mut Inner,
    write: &TransitionWrite,
) -> Result<Option<Quotation>, AppError> {
    let quotation = match inner.quotations.get_mut(&write.quotation_id) {
        Some(q) => q,
        None => return Ok(None),
    };
    if quotation.status() != write.expected_from {
        return Ok(None);
    }

    let previous = quotation.status.clone();
    quotation.status = write.to.as_str().to_string();
    quotation.updated_utc = write.now;
    if write.mark_sent {
        quotation.sent_at = Some(write.now);
    }

    inner
        .history
        .entry(write.quotation_id)
        .or_default()
        .push(StatusHistoryEntry {
            entry_id: Uuid::new_v4(),
            quotation_id: write.quotation_id,
            previous_status: Some(previous),
            new_status: write.to.as_str().to_string(),
            actor: write.actor,
            reason: write.reason.clone(),
            created_utc: write.now,
        });

    Ok(Some(inner.quotations[&write.quotation_id].clone()))
}

#[async_trait]
impl QuotationStore for MemoryStore {
    async fn create_quotation(&self, input: NewQuotation) -> Result<Quotation, AppError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let quotation_id = Uuid::new_v4();
        inner.quotation_seq += 1;
        let number = format!("QT-{:05}", inner.quotation_seq);

        let quotation = Quotation {
            quotation_id,
            quotation_number: number,
            client_id: input.client_id,
            created_by: input.created_by,
            status: QuotationStatus::Draft.as_str().to_string(),
            quotation_date: input.quotation_date,
            valid_until: input.valid_until,
            sub_total: input.totals.sub_total,
            discount_percentage: input.totals.discount_percentage,
            discount_amount: input.totals.discount_amount,
            taxable_amount: input.totals.taxable_amount,
            total_tax: input.totals.tax.total_tax,
            total_amount: input.totals.total_amount,
            tax_exempt: input.tax_exempt,
            tax_zero_rated: input.tax_zero_rated,
            tax_breakdown: serde_json::to_value(&input.totals.tax)
                .unwrap_or(serde_json::Value::Null),
            notes: input.notes,
            sent_at: None,
            last_reminder_at: None,
            last_follow_up_at: None,
            created_utc: now,
            updated_utc: now,
        };

        let items = line_items_from_create(quotation_id, &input.line_items, now);
        inner.line_items.insert(quotation_id, items);
        inner.history.insert(
            quotation_id,
            vec![StatusHistoryEntry {
                entry_id: Uuid::new_v4(),
                quotation_id,
                previous_status: None,
                new_status: QuotationStatus::Draft.as_str().to_string(),
                actor: Some(input.created_by),
                reason: None,
                created_utc: now,
            }],
        );
        inner.quotations.insert(quotation_id, quotation.clone());

        Ok(quotation)
    }

    async fn get_quotation(&self, quotation_id: Uuid) -> Result<Option<Quotation>, AppError> {
        Ok(self.inner.read().await.quotations.get(&quotation_id).cloned())
    }

    async fn get_line_items(&self, quotation_id: Uuid) -> Result<Vec<LineItem>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .line_items
            .get(&quotation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_draft(
        &self,
        quotation_id: Uuid,
        update: DraftUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Quotation>, AppError> {
        let mut inner = self.inner.write().await;
        let quotation = match inner.quotations.get_mut(&quotation_id) {
            Some(q) if q.status() == QuotationStatus::Draft => q,
            _ => return Ok(None),
        };

        quotation.quotation_date = update.quotation_date;
        quotation.valid_until = update.valid_until;
        quotation.notes = update.notes;
        quotation.tax_exempt = update.tax_exempt;
        quotation.tax_zero_rated = update.tax_zero_rated;
        quotation.tax_breakdown =
            serde_json::to_value(&update.totals.tax).unwrap_or(serde_json::Value::Null);
        quotation.sub_total = update.totals.sub_total;
        quotation.discount_percentage = update.totals.discount_percentage;
        quotation.discount_amount = update.totals.discount_amount;
        quotation.taxable_amount = update.totals.taxable_amount;
        quotation.total_tax = update.totals.tax.total_tax;
        quotation.total_amount = update.totals.total_amount;
        quotation.updated_utc = now;
        let updated = quotation.clone();

        let items = line_items_from_create(quotation_id, &update.line_items, now);
        inner.line_items.insert(quotation_id, items);

        Ok(Some(updated))
    }

    async fn transition(&self, write: TransitionWrite) -> Result<Option<Quotation>, AppError> {
        let mut inner = self.inner.write().await;
        apply_transition(&mut inner, &write)
    }

    async fn get_history(
        &self,
        quotation_id: Uuid,
    ) -> Result<Vec<StatusHistoryEntry>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .history
            .get(&quotation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_link(&self, input: NewAccessLink) -> Result<AccessLink, AppError> {
        let mut inner = self.inner.write().await;
        for link in inner.links.values_mut() {
            if link.quotation_id == input.quotation_id {
                link.is_active = false;
            }
        }

        let link = AccessLink {
            link_id: Uuid::new_v4(),
            quotation_id: input.quotation_id,
            token: input.token,
            recipient_email: input.recipient_email,
            is_active: true,
            expires_at: input.expires_at,
            sent_at: input.sent_at,
            first_viewed_at: None,
            view_count: 0,
            created_utc: input.sent_at,
        };
        inner.links.insert(link.link_id, link.clone());
        Ok(link)
    }

    async fn get_links(&self, quotation_id: Uuid) -> Result<Vec<AccessLink>, AppError> {
        let inner = self.inner.read().await;
        let mut links: Vec<AccessLink> = inner
            .links
            .values()
            .filter(|l| l.quotation_id == quotation_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(links)
    }

    async fn record_view(
        &self,
        link_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ViewRecord, AppError> {
        let mut inner = self.inner.write().await;
        let link = inner
            .links
            .get_mut(&link_id)
            .ok_or(AppError::LinkNotFound)?;

        let first_view = link.first_viewed_at.is_none();
        if first_view {
            link.first_viewed_at = Some(now);
        }
        link.view_count += 1;

        Ok(ViewRecord {
            first_view,
            view_count: link.view_count,
        })
    }

    async fn get_response(
        &self,
        quotation_id: Uuid,
    ) -> Result<Option<ClientResponse>, AppError> {
        Ok(self.inner.read().await.responses.get(&quotation_id).cloned())
    }

    async fn record_response(
        &self,
        quotation_id: Uuid,
        input: SubmitResponse,
        transition: TransitionWrite,
    ) -> Result<(ClientResponse, Quotation), AppError> {
        let mut inner = self.inner.write().await;
        if inner.responses.contains_key(&quotation_id) {
            return Err(AppError::DuplicateResponse);
        }

        let quotation =
            apply_transition(&mut inner, &transition)?.ok_or_else(|| {
                AppError::InvalidStateTransition {
                    current: "unknown".to_string(),
                    event: "client_respond".to_string(),
                    reason: "status changed concurrently".to_string(),
                }
            })?;

        let response = ClientResponse {
            response_id: Uuid::new_v4(),
            quotation_id,
            response_type: input.response_type.as_str().to_string(),
            respondent_name: input.respondent_name,
            respondent_email: input.respondent_email,
            message: input.message,
            origin_ip: input.origin_ip,
            created_utc: transition.now,
        };
        inner.responses.insert(quotation_id, response.clone());

        Ok((response, quotation))
    }

    async fn list_expirable(&self, today: NaiveDate) -> Result<Vec<Quotation>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .quotations
            .values()
            .filter(|q| {
                matches!(q.status(), QuotationStatus::Sent | QuotationStatus::Viewed)
                    && q.valid_until < today
            })
            .cloned()
            .collect())
    }

    async fn list_due_reminders(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .quotations
            .values()
            .filter(|q| {
                q.status() == QuotationStatus::Sent
                    && q.last_reminder_at.is_none()
                    && q.sent_at.map_or(false, |sent| sent < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn mark_reminder_sent(
        &self,
        quotation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        match inner.quotations.get_mut(&quotation_id) {
            Some(q) if q.status() == QuotationStatus::Sent && q.last_reminder_at.is_none() => {
                q.last_reminder_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_reminder_marker(&self, quotation_id: Uuid) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if let Some(q) = inner.quotations.get_mut(&quotation_id) {
            q.last_reminder_at = None;
        }
        Ok(())
    }

    async fn list_due_follow_ups(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .quotations
            .values()
            .filter(|q| {
                if q.status() != QuotationStatus::Viewed || q.last_follow_up_at.is_some() {
                    return false;
                }
                if inner.responses.contains_key(&q.quotation_id) {
                    return false;
                }
                inner
                    .links
                    .values()
                    .filter(|l| l.quotation_id == q.quotation_id)
                    .filter_map(|l| l.first_viewed_at)
                    .min()
                    .map_or(false, |first| first < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn mark_follow_up_sent(
        &self,
        quotation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        match inner.quotations.get_mut(&quotation_id) {
            Some(q) if q.status() == QuotationStatus::Viewed && q.last_follow_up_at.is_none() => {
                q.last_follow_up_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_follow_up_marker(&self, quotation_id: Uuid) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if let Some(q) = inner.quotations.get_mut(&quotation_id) {
            q.last_follow_up_at = None;
        }
        Ok(())
    }

    async fn list_stale_drafts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quotation>, AppError> {
        let inner = self.inner.read().await;
        let mut drafts: Vec<Quotation> = inner
            .quotations
            .values()
            .filter(|q| q.status() == QuotationStatus::Draft && q.updated_utc < cutoff)
            .cloned()
            .collect();
        drafts.sort_by_key(|q| q.updated_utc);
        Ok(drafts)
    }

    async fn create_country(&self, input: CreateCountry) -> Result<Country, AppError> {
        let mut inner = self.inner.write().await;
        if inner
            .countries
            .iter()
            .any(|c| c.code == input.code || c.name == input.name)
        {
            return Err(AppError::ConfigurationConflict(anyhow!(
                "country '{}' ({}) already exists",
                input.name,
                input.code
            )));
        }
        let country = Country {
            country_id: Uuid::new_v4(),
            code: input.code,
            name: input.name,
            created_utc: Utc::now(),
        };
        inner.countries.push(country.clone());
        Ok(country)
    }

    async fn list_countries(&self) -> Result<Vec<Country>, AppError> {
        Ok(self.inner.read().await.countries.clone())
    }

    async fn create_framework(
        &self,
        input: CreateTaxFramework,
    ) -> Result<TaxFramework, AppError> {
        let mut inner = self.inner.write().await;
        if !inner.countries.iter().any(|c| c.country_id == input.country_id) {
            return Err(AppError::NotFound(anyhow!("country not found")));
        }
        if inner
            .frameworks
            .iter()
            .any(|f| f.country_id == input.country_id)
        {
            return Err(AppError::ConfigurationConflict(anyhow!(
                "country already has a tax framework"
            )));
        }
        let framework = TaxFramework {
            framework_id: Uuid::new_v4(),
            country_id: input.country_id,
            name: input.name,
            component_names: serde_json::json!(input.component_names),
            created_utc: Utc::now(),
        };
        inner.frameworks.push(framework.clone());
        Ok(framework)
    }

    async fn get_framework(
        &self,
        framework_id: Uuid,
    ) -> Result<Option<TaxFramework>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .frameworks
            .iter()
            .find(|f| f.framework_id == framework_id)
            .cloned())
    }

    async fn get_framework_for_country(
        &self,
        country_id: Uuid,
    ) -> Result<Option<TaxFramework>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .frameworks
            .iter()
            .find(|f| f.country_id == country_id)
            .cloned())
    }

    async fn create_jurisdiction(
        &self,
        input: CreateJurisdiction,
    ) -> Result<Jurisdiction, AppError> {
        let mut inner = self.inner.write().await;
        if !inner.countries.iter().any(|c| c.country_id == input.country_id) {
            return Err(AppError::NotFound(anyhow!("country not found")));
        }
        let jurisdiction = Jurisdiction {
            jurisdiction_id: Uuid::new_v4(),
            country_id: input.country_id,
            parent_id: input.parent_id,
            name: input.name,
            created_utc: Utc::now(),
        };
        inner.jurisdictions.push(jurisdiction.clone());
        Ok(jurisdiction)
    }

    async fn list_jurisdictions(
        &self,
        country_id: Option<Uuid>,
    ) -> Result<Vec<Jurisdiction>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .jurisdictions
            .iter()
            .filter(|j| country_id.map_or(true, |c| j.country_id == c))
            .cloned()
            .collect())
    }

    async fn create_category(
        &self,
        input: CreateCategory,
    ) -> Result<ProductServiceCategory, AppError> {
        let mut inner = self.inner.write().await;
        let category = ProductServiceCategory {
            category_id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            created_utc: Utc::now(),
        };
        inner.categories.push(category.clone());
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<ProductServiceCategory>, AppError> {
        Ok(self.inner.read().await.categories.clone())
    }

    async fn create_tax_rate(&self, input: CreateTaxRate) -> Result<TaxRate, AppError> {
        let mut inner = self.inner.write().await;

        // Same backstop as the database exclusion constraint: two writers
        // racing past the service-level validation cannot both land.
        let existing: Vec<TaxRate> = inner
            .tax_rates
            .iter()
            .filter(|r| r.framework_id == input.framework_id)
            .cloned()
            .collect();
        validate_no_overlap(
            &existing,
            input.jurisdiction_id,
            input.category_id,
            input.effective_from,
            input.effective_to,
        )?;

        let rate = TaxRate {
            tax_rate_id: Uuid::new_v4(),
            framework_id: input.framework_id,
            jurisdiction_id: input.jurisdiction_id,
            category_id: input.category_id,
            name: input.name,
            rate: input.rate,
            is_exempt: input.is_exempt,
            is_zero_rated: input.is_zero_rated,
            effective_from: input.effective_from,
            effective_to: input.effective_to,
            components: input.components,
            created_utc: Utc::now(),
        };
        inner.tax_rates.push(rate.clone());
        Ok(rate)
    }

    async fn get_tax_rate(&self, tax_rate_id: Uuid) -> Result<Option<TaxRate>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .tax_rates
            .iter()
            .find(|r| r.tax_rate_id == tax_rate_id)
            .cloned())
    }

    async fn list_rates_for_framework(
        &self,
        framework_id: Uuid,
    ) -> Result<Vec<TaxRate>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .tax_rates
            .iter()
            .filter(|r| r.framework_id == framework_id)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, entry: AppendAudit) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        inner.audit.push(TaxConfigAudit {
            audit_id: Uuid::new_v4(),
            action: entry.action,
            entity_kind: entry.entity_kind,
            entity_id: entry.entity_id,
            snapshot: entry.snapshot,
            actor: entry.actor,
            created_utc: Utc::now(),
        });
        Ok(())
    }
}
