//! Shared fixtures: in-memory store, mock notifier, canned inputs.

#![allow(dead_code)]

use chrono::NaiveDate;
use quotation_service::middleware::{Actor, ActorRole};
use quotation_service::models::{CreateLineItem, CreateQuotation, TaxContext};
use quotation_service::services::approvals::{ApprovalGateway, DiscountThresholdGateway};
use quotation_service::services::notifier::MockNotifier;
use quotation_service::services::{MemoryStore, QuotationService, TaxConfigService};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

pub const LINK_TTL_DAYS: i64 = 30;

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<MockNotifier>,
    pub quotations: QuotationService,
    pub tax_config: TaxConfigService,
}

pub fn harness() -> TestHarness {
    harness_with_discount_cap(dec!(20))
}

pub fn harness_with_discount_cap(max_unapproved_discount: Decimal) -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let approvals: Arc<dyn ApprovalGateway> =
        Arc::new(DiscountThresholdGateway::new(max_unapproved_discount));

    let quotations = QuotationService::new(
        store.clone(),
        approvals,
        notifier.clone(),
        LINK_TTL_DAYS,
        "http://localhost:8080".to_string(),
    );
    let tax_config = TaxConfigService::new(store.clone());

    TestHarness {
        store,
        notifier,
        quotations,
        tax_config,
    }
}

pub fn member(user_id: Uuid) -> Actor {
    Actor {
        user_id,
        role: ActorRole::Member,
    }
}

pub fn manager(user_id: Uuid) -> Actor {
    Actor {
        user_id,
        role: ActorRole::Manager,
    }
}

pub fn item(name: &str, quantity: Decimal, unit_rate: Decimal) -> CreateLineItem {
    CreateLineItem {
        name: name.to_string(),
        quantity,
        unit_rate,
        category_id: None,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn draft_input(
    created_by: Uuid,
    line_items: Vec<CreateLineItem>,
) -> CreateQuotation {
    CreateQuotation {
        client_id: Uuid::new_v4(),
        created_by,
        quotation_date: date(2025, 3, 1),
        valid_until: date(2025, 3, 31),
        discount_percentage: Decimal::ZERO,
        notes: None,
        tax: TaxContext::default(),
        line_items,
    }
}
