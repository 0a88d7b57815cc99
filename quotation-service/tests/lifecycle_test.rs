//! End-to-end lifecycle flows through the service layer, driven against
//! the in-memory store and mock notifier.

mod common;

use chrono::{TimeZone, Utc};
use common::{date, draft_input, harness, item, manager, member};
use quotation_service::models::{
    QuotationStatus, ResponseType, SubmitResponse, TaxContext, UpdateQuotation,
};
use quotation_service::services::notifier::NotificationKind;
use quotation_service::services::QuotationStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use service_core::error::AppError;
use uuid::Uuid;

#[tokio::test]
async fn create_draft_computes_totals_and_writes_initial_history() {
    let h = harness();
    let owner = Uuid::new_v4();

    let view = h
        .quotations
        .create(draft_input(
            owner,
            vec![item("Consulting", dec!(10), dec!(150)), item("Travel", dec!(1), dec!(500))],
        ))
        .await
        .unwrap();

    assert_eq!(view.quotation.status(), QuotationStatus::Draft);
    assert!(view.quotation.quotation_number.starts_with("QT-"));
    assert_eq!(view.quotation.sub_total, dec!(2000));
    assert_eq!(view.quotation.discount_amount, Decimal::ZERO);
    assert_eq!(view.quotation.taxable_amount, dec!(2000));
    assert_eq!(view.quotation.total_tax, Decimal::ZERO);
    assert_eq!(view.quotation.total_amount, dec!(2000));
    assert_eq!(view.line_items.len(), 2);

    let history = h
        .quotations
        .history(view.quotation.quotation_id, &member(owner))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].previous_status, None);
    assert_eq!(history[0].new_status, "draft");
}

#[tokio::test]
async fn quotation_numbers_are_sequential() {
    let h = harness();
    let owner = Uuid::new_v4();

    let first = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(1))]))
        .await
        .unwrap();
    let second = h
        .quotations
        .create(draft_input(owner, vec![item("B", dec!(1), dec!(1))]))
        .await
        .unwrap();

    assert_ne!(
        first.quotation.quotation_number,
        second.quotation.quotation_number
    );
}

#[tokio::test]
async fn create_rejects_inverted_validity_window() {
    let h = harness();
    let mut input = draft_input(Uuid::new_v4(), vec![item("A", dec!(1), dec!(1))]);
    input.valid_until = date(2025, 2, 1);

    let err = h.quotations.create(input).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn create_rejects_bad_line_items() {
    let h = harness();

    let mut input = draft_input(Uuid::new_v4(), vec![item("", dec!(1), dec!(1))]);
    assert!(matches!(
        h.quotations.create(input).await.unwrap_err(),
        AppError::BadRequest(_)
    ));

    input = draft_input(Uuid::new_v4(), vec![item("A", dec!(0), dec!(1))]);
    assert!(matches!(
        h.quotations.create(input).await.unwrap_err(),
        AppError::BadRequest(_)
    ));

    input = draft_input(Uuid::new_v4(), vec![item("A", dec!(1), dec!(-5))]);
    assert!(matches!(
        h.quotations.create(input).await.unwrap_err(),
        AppError::BadRequest(_)
    ));
}

#[tokio::test]
async fn send_issues_link_and_notifies_recipient() {
    let h = harness();
    let owner = Uuid::new_v4();
    let actor = member(owner);
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(2), dec!(100))]))
        .await
        .unwrap();
    let id = view.quotation.quotation_id;

    let (quotation, link) = h
        .quotations
        .send(id, "client@example.com".to_string(), &actor, now)
        .await
        .unwrap();

    assert_eq!(quotation.status(), QuotationStatus::Sent);
    assert_eq!(quotation.sent_at, Some(now));
    assert!(link.is_active);
    assert_eq!(link.token.len(), 43);
    assert_eq!(link.expires_at, now + chrono::Duration::days(common::LINK_TTL_DAYS));

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::QuotationSent);
    assert_eq!(sent[0].to, "client@example.com");
    assert!(sent[0].body.contains(&link.token), "portal URL carries the token");

    let history = h.quotations.history(id, &actor).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].previous_status.as_deref(), Some("draft"));
    assert_eq!(history[1].new_status, "sent");
    assert_eq!(history[1].actor, Some(owner));
}

#[tokio::test]
async fn send_requires_line_items() {
    let h = harness();
    let owner = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![]))
        .await
        .unwrap();

    let err = h
        .quotations
        .send(
            view.quotation.quotation_id,
            "client@example.com".to_string(),
            &member(owner),
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));
    assert_eq!(h.notifier.sent().len(), 0);
}

#[tokio::test]
async fn send_blocked_by_discount_above_threshold() {
    // Harness cap is 20 percent.
    let h = harness();
    let owner = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let mut input = draft_input(owner, vec![item("A", dec!(1), dec!(1000))]);
    input.discount_percentage = dec!(25);
    let view = h.quotations.create(input).await.unwrap();

    let err = h
        .quotations
        .send(
            view.quotation.quotation_id,
            "client@example.com".to_string(),
            &member(owner),
            now,
        )
        .await
        .unwrap_err();
    match err {
        AppError::InvalidStateTransition { reason, .. } => {
            assert!(reason.contains("approval"), "reason was: {reason}");
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[tokio::test]
async fn non_owner_member_is_forbidden_but_manager_is_not() {
    let h = harness();
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(1))]))
        .await
        .unwrap();
    let id = view.quotation.quotation_id;

    let err = h.quotations.get(id, &member(stranger)).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assert!(h.quotations.get(id, &manager(stranger)).await.is_ok());
    assert!(h.quotations.get(id, &member(owner)).await.is_ok());
}

#[tokio::test]
async fn update_replaces_draft_and_recomputes_totals() {
    let h = harness();
    let owner = Uuid::new_v4();
    let actor = member(owner);
    let now = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(100))]))
        .await
        .unwrap();
    let id = view.quotation.quotation_id;

    let updated = h
        .quotations
        .update(
            id,
            UpdateQuotation {
                quotation_date: date(2025, 3, 1),
                valid_until: date(2025, 4, 30),
                discount_percentage: dec!(10),
                notes: Some("revised".to_string()),
                tax: TaxContext::default(),
                line_items: vec![item("B", dec!(3), dec!(200))],
            },
            &actor,
            now,
        )
        .await
        .unwrap();

    assert_eq!(updated.quotation.sub_total, dec!(600));
    assert_eq!(updated.quotation.discount_amount, dec!(60));
    assert_eq!(updated.quotation.taxable_amount, dec!(540));
    assert_eq!(updated.quotation.total_amount, dec!(540));
    assert_eq!(updated.quotation.valid_until, date(2025, 4, 30));
    assert_eq!(updated.line_items.len(), 1);
    assert_eq!(updated.line_items[0].name, "B");
}

#[tokio::test]
async fn update_rejected_once_sent() {
    let h = harness();
    let owner = Uuid::new_v4();
    let actor = member(owner);
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(100))]))
        .await
        .unwrap();
    let id = view.quotation.quotation_id;
    h.quotations
        .send(id, "client@example.com".to_string(), &actor, now)
        .await
        .unwrap();

    let err = h
        .quotations
        .update(
            id,
            UpdateQuotation {
                quotation_date: date(2025, 3, 1),
                valid_until: date(2025, 3, 31),
                discount_percentage: Decimal::ZERO,
                notes: None,
                tax: TaxContext::default(),
                line_items: vec![item("A", dec!(1), dec!(100))],
            },
            &actor,
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn resend_rotates_the_link_and_records_it() {
    let h = harness();
    let owner = Uuid::new_v4();
    let actor = member(owner);
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2025, 3, 8, 10, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(100))]))
        .await
        .unwrap();
    let id = view.quotation.quotation_id;

    let (_, first_link) = h
        .quotations
        .send(id, "client@example.com".to_string(), &actor, now)
        .await
        .unwrap();
    let (quotation, second_link) = h
        .quotations
        .resend(id, "client@example.com".to_string(), &actor, later)
        .await
        .unwrap();

    assert_eq!(quotation.status(), QuotationStatus::Sent);
    assert_ne!(first_link.token, second_link.token);

    let links = h.quotations.links(id, &actor).await.unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links.iter().filter(|l| l.is_active).count(), 1);
    let active = links.iter().find(|l| l.is_active).unwrap();
    assert_eq!(active.link_id, second_link.link_id);

    // Draft, send, and the audit entry for the resend.
    let history = h.quotations.history(id, &actor).await.unwrap();
    assert_eq!(history.len(), 3);
    let last = history.last().unwrap();
    assert_eq!(last.previous_status.as_deref(), Some("sent"));
    assert_eq!(last.new_status, "sent");
    assert_eq!(last.actor, Some(owner));
    assert_eq!(last.reason.as_deref(), Some("resent, link rotated"));

    // The resend restarts the reminder clock.
    let q = h.store.get_quotation(id).await.unwrap().unwrap();
    assert_eq!(q.sent_at, Some(later));

    assert_eq!(h.notifier.count_of(NotificationKind::QuotationSent), 2);
}

#[tokio::test]
async fn resend_rejected_for_drafts() {
    let h = harness();
    let owner = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(100))]))
        .await
        .unwrap();

    let err = h
        .quotations
        .resend(
            view.quotation.quotation_id,
            "client@example.com".to_string(),
            &member(owner),
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn delete_is_a_soft_cancel_and_terminal() {
    let h = harness();
    let owner = Uuid::new_v4();
    let actor = member(owner);
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(100))]))
        .await
        .unwrap();
    let id = view.quotation.quotation_id;

    let cancelled = h.quotations.delete(id, &actor, now).await.unwrap();
    assert_eq!(cancelled.status(), QuotationStatus::Cancelled);

    // Still readable, history preserved.
    let fetched = h.quotations.get(id, &actor).await.unwrap();
    assert_eq!(fetched.quotation.status(), QuotationStatus::Cancelled);
    let history = h.quotations.history(id, &actor).await.unwrap();
    assert_eq!(history.last().unwrap().new_status, "cancelled");
    assert_eq!(
        history.last().unwrap().reason.as_deref(),
        Some("deleted by user")
    );

    let err = h.quotations.delete(id, &actor, now).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn full_accept_flow_from_draft_to_accepted() {
    let h = harness();
    let owner = Uuid::new_v4();
    let actor = member(owner);
    let sent_at = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let viewed_at = Utc.with_ymd_and_hms(2025, 3, 6, 15, 30, 0).unwrap();
    let responded_at = Utc.with_ymd_and_hms(2025, 3, 7, 9, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(2), dec!(100))]))
        .await
        .unwrap();
    let id = view.quotation.quotation_id;

    let (_, link) = h
        .quotations
        .send(id, "client@example.com".to_string(), &actor, sent_at)
        .await
        .unwrap();

    let portal = h
        .quotations
        .access_links()
        .view(id, &link.token, viewed_at)
        .await
        .unwrap();
    assert_eq!(portal.quotation.status(), QuotationStatus::Viewed);
    assert!(portal.view.first_view);
    assert_eq!(portal.view.view_count, 1);

    let (response, quotation) = h
        .quotations
        .access_links()
        .respond(
            id,
            &link.token,
            SubmitResponse {
                response_type: ResponseType::Accepted,
                respondent_name: "Pat Client".to_string(),
                respondent_email: "client@example.com".to_string(),
                message: Some("Looks good".to_string()),
                origin_ip: Some("203.0.113.9".to_string()),
            },
            responded_at,
        )
        .await
        .unwrap();

    assert_eq!(response.response_type, "accepted");
    assert_eq!(quotation.status(), QuotationStatus::Accepted);
    assert_eq!(h.notifier.count_of(NotificationKind::ResponseReceived), 1);

    let history = h.quotations.history(id, &actor).await.unwrap();
    let statuses: Vec<&str> = history.iter().map(|e| e.new_status.as_str()).collect();
    assert_eq!(statuses, vec!["draft", "sent", "viewed", "accepted"]);
    // Client-driven entries carry no internal actor.
    assert_eq!(history[2].actor, None);
    assert_eq!(history[3].actor, None);
}

#[tokio::test]
async fn rejection_lands_in_rejected() {
    let h = harness();
    let owner = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(100))]))
        .await
        .unwrap();
    let id = view.quotation.quotation_id;
    let (_, link) = h
        .quotations
        .send(id, "client@example.com".to_string(), &member(owner), now)
        .await
        .unwrap();

    // Responding straight from Sent, without a prior view, is legal.
    let (_, quotation) = h
        .quotations
        .access_links()
        .respond(
            id,
            &link.token,
            SubmitResponse {
                response_type: ResponseType::Rejected,
                respondent_name: "Pat Client".to_string(),
                respondent_email: "client@example.com".to_string(),
                message: None,
                origin_ip: None,
            },
            now + chrono::Duration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(quotation.status(), QuotationStatus::Rejected);
}

#[tokio::test]
async fn notification_failure_does_not_fail_the_send() {
    let h = harness();
    h.notifier.fail_next();
    let owner = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let view = h
        .quotations
        .create(draft_input(owner, vec![item("A", dec!(1), dec!(100))]))
        .await
        .unwrap();

    let (quotation, _) = h
        .quotations
        .send(
            view.quotation.quotation_id,
            "client@example.com".to_string(),
            &member(owner),
            now,
        )
        .await
        .unwrap();
    assert_eq!(quotation.status(), QuotationStatus::Sent);
    assert_eq!(h.notifier.sent().len(), 0);
}

#[tokio::test]
async fn missing_quotation_is_not_found() {
    let h = harness();
    let err = h
        .quotations
        .get(Uuid::new_v4(), &member(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
