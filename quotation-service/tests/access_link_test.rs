//! Access link security behavior: issuance, rotation, expiry and the
//! error surface a portal caller sees.

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{draft_input, harness, item, member};
use quotation_service::models::{QuotationStatus, ResponseType, SubmitResponse};
use rust_decimal_macros::dec;
use service_core::error::AppError;
use uuid::Uuid;

fn accept_payload() -> SubmitResponse {
    SubmitResponse {
        response_type: ResponseType::Accepted,
        respondent_name: "Pat Client".to_string(),
        respondent_email: "client@example.com".to_string(),
        message: None,
        origin_ip: None,
    }
}

async fn sent_quotation(
    h: &common::TestHarness,
    owner: Uuid,
    now: chrono::DateTime<Utc>,
) -> (Uuid, String) {
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
    (id, link.token)
}

#[tokio::test]
async fn wrong_token_is_not_found() {
    let h = harness();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let (id, _token) = sent_quotation(&h, Uuid::new_v4(), now).await;

    let err = h
        .quotations
        .access_links()
        .view(id, "definitely-not-the-token", now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LinkNotFound));
}

#[tokio::test]
async fn unknown_quotation_is_not_found() {
    let h = harness();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

    let err = h
        .quotations
        .access_links()
        .view(Uuid::new_v4(), "whatever", now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LinkNotFound));
}

#[tokio::test]
async fn correct_token_on_a_lapsed_link_is_expired() {
    let h = harness();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let (id, token) = sent_quotation(&h, Uuid::new_v4(), now).await;

    let past_expiry = now + Duration::days(common::LINK_TTL_DAYS + 1);
    let err = h
        .quotations
        .access_links()
        .view(id, &token, past_expiry)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LinkExpired));

    let err = h
        .quotations
        .access_links()
        .respond(id, &token, accept_payload(), past_expiry)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LinkExpired));
}

#[tokio::test]
async fn rotated_link_retires_the_old_token() {
    let h = harness();
    let owner = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let (id, old_token) = sent_quotation(&h, owner, now).await;

    let (_, new_link) = h
        .quotations
        .resend(id, "client@example.com".to_string(), &member(owner), now)
        .await
        .unwrap();

    // A retired link is indistinguishable from a wrong token.
    let err = h
        .quotations
        .access_links()
        .view(id, &old_token, now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LinkNotFound));

    assert!(h
        .quotations
        .access_links()
        .view(id, &new_link.token, now)
        .await
        .is_ok());
}

#[tokio::test]
async fn views_count_up_but_first_view_is_recorded_once() {
    let h = harness();
    let owner = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let (id, token) = sent_quotation(&h, owner, now).await;

    for n in 1..=4 {
        let portal = h
            .quotations
            .access_links()
            .view(id, &token, now + Duration::hours(n))
            .await
            .unwrap();
        assert_eq!(portal.view.view_count, n);
        assert_eq!(portal.view.first_view, n == 1);
        assert_eq!(portal.quotation.status(), QuotationStatus::Viewed);
    }

    let links = h.quotations.links(id, &member(owner)).await.unwrap();
    let active = links.iter().find(|l| l.is_active).unwrap();
    assert_eq!(active.view_count, 4);
    assert_eq!(active.first_viewed_at, Some(now + Duration::hours(1)));

    // Repeat views leave a single viewed entry in the history.
    let history = h.quotations.history(id, &member(owner)).await.unwrap();
    let viewed_entries = history.iter().filter(|e| e.new_status == "viewed").count();
    assert_eq!(viewed_entries, 1);
}

#[tokio::test]
async fn failed_view_on_a_terminal_quotation_leaves_the_counter_alone() {
    use quotation_service::services::store::TransitionWrite;
    use quotation_service::services::QuotationStore;

    let h = harness();
    let owner = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let (id, token) = sent_quotation(&h, owner, now).await;

    // The link outlives the validity window: the quotation expires while
    // its token is still live.
    h.store
        .transition(TransitionWrite {
            quotation_id: id,
            expected_from: QuotationStatus::Sent,
            to: QuotationStatus::Expired,
            actor: None,
            reason: Some("validity window lapsed".to_string()),
            mark_sent: false,
            now: now + Duration::days(29),
        })
        .await
        .unwrap()
        .unwrap();

    let err = h
        .quotations
        .access_links()
        .view(id, &token, now + Duration::days(29))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));

    // The rejected view is not audited as a view.
    let links = h.quotations.links(id, &member(owner)).await.unwrap();
    let active = links.iter().find(|l| l.is_active).unwrap();
    assert_eq!(active.view_count, 0);
    assert_eq!(active.first_viewed_at, None);
}

#[tokio::test]
async fn second_response_is_a_duplicate() {
    let h = harness();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let (id, token) = sent_quotation(&h, Uuid::new_v4(), now).await;

    h.quotations
        .access_links()
        .respond(id, &token, accept_payload(), now)
        .await
        .unwrap();

    let err = h
        .quotations
        .access_links()
        .respond(id, &token, accept_payload(), now + Duration::minutes(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateResponse));
}

#[tokio::test]
async fn portal_view_exposes_totals_and_line_items_only() {
    let h = harness();
    let now = Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();
    let (id, token) = sent_quotation(&h, Uuid::new_v4(), now).await;

    let portal = h
        .quotations
        .access_links()
        .view(id, &token, now)
        .await
        .unwrap();
    assert_eq!(portal.line_items.len(), 1);
    assert_eq!(portal.quotation.total_amount, dec!(100));

    // The token never appears in serialized output.
    let links = serde_json::to_value(
        h.quotations
            .links(id, &member(portal.quotation.created_by))
            .await
            .unwrap(),
    )
    .unwrap();
    assert!(links[0].get("token").is_none());
}
