//! Transition table coverage: every status/event pair either yields the
//! documented outcome or a structured rejection, never a silent no-op.

use chrono::NaiveDate;
use quotation_service::domain::{apply, QuotationEvent, TransitionContext};
use quotation_service::models::{QuotationStatus, ResponseType};
use service_core::error::AppError;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Context with every guard satisfied and the validity window lapsed, so
/// any event that the table allows from the given status will pass.
fn permissive_ctx() -> TransitionContext {
    let mut ctx = TransitionContext::new(date(2025, 3, 31), date(2025, 4, 1));
    ctx.line_item_count = 2;
    ctx.token_valid = true;
    ctx
}

const ALL_STATUSES: [QuotationStatus; 7] = [
    QuotationStatus::Draft,
    QuotationStatus::Sent,
    QuotationStatus::Viewed,
    QuotationStatus::Accepted,
    QuotationStatus::Rejected,
    QuotationStatus::Expired,
    QuotationStatus::Cancelled,
];

const ALL_EVENTS: [QuotationEvent; 7] = [
    QuotationEvent::Send,
    QuotationEvent::Resend,
    QuotationEvent::ClientView,
    QuotationEvent::ClientRespond(ResponseType::Accepted),
    QuotationEvent::ClientRespond(ResponseType::Rejected),
    QuotationEvent::Delete,
    QuotationEvent::AutoExpire,
];

/// The full legal surface under a permissive context. Everything not
/// listed here must be rejected.
fn expected(
    from: QuotationStatus,
    event: QuotationEvent,
) -> Option<(QuotationStatus, bool)> {
    use QuotationEvent::*;
    use QuotationStatus::*;
    match (from, event) {
        (Draft, Send) => Some((Sent, true)),
        (Sent, Resend) => Some((Sent, false)),
        (Sent, ClientView) => Some((Viewed, true)),
        (Viewed, ClientView) => Some((Viewed, false)),
        (Sent | Viewed, ClientRespond(ResponseType::Accepted)) => Some((Accepted, true)),
        (Sent | Viewed, ClientRespond(ResponseType::Rejected)) => Some((Rejected, true)),
        (Draft | Sent | Viewed, Delete) => Some((Cancelled, true)),
        (Sent | Viewed, AutoExpire) => Some((Expired, true)),
        _ => None,
    }
}

#[test]
fn full_matrix_matches_transition_table() {
    let ctx = permissive_ctx();

    for from in ALL_STATUSES {
        for event in ALL_EVENTS {
            let result = apply(from, event, &ctx);
            match expected(from, event) {
                Some((to, changed)) => {
                    let outcome = result.unwrap_or_else(|e| {
                        panic!("{from} + {} should be legal: {e}", event.as_str())
                    });
                    assert_eq!(outcome.from, from);
                    assert_eq!(outcome.to, to, "{from} + {}", event.as_str());
                    assert_eq!(outcome.changed, changed, "{from} + {}", event.as_str());
                }
                None => match result {
                    Ok(outcome) => panic!(
                        "{from} + {} should be rejected, got {:?}",
                        event.as_str(),
                        outcome
                    ),
                    Err(AppError::InvalidStateTransition { current, event: e, .. }) => {
                        assert_eq!(current, from.as_str());
                        assert_eq!(e, event.as_str());
                    }
                    Err(other) => panic!("unexpected error kind: {other:?}"),
                },
            }
        }
    }
}

#[test]
fn terminal_statuses_name_themselves_in_the_rejection() {
    let ctx = permissive_ctx();
    for from in [
        QuotationStatus::Accepted,
        QuotationStatus::Rejected,
        QuotationStatus::Expired,
        QuotationStatus::Cancelled,
    ] {
        let err = apply(from, QuotationEvent::Delete, &ctx).unwrap_err();
        match err {
            AppError::InvalidStateTransition { reason, .. } => {
                assert!(reason.contains("terminal"), "reason was: {reason}");
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}

#[test]
fn send_requires_line_items() {
    let mut ctx = permissive_ctx();
    ctx.line_item_count = 0;
    let err = apply(QuotationStatus::Draft, QuotationEvent::Send, &ctx).unwrap_err();
    match err {
        AppError::InvalidStateTransition { reason, .. } => {
            assert!(reason.contains("line items"), "reason was: {reason}");
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[test]
fn send_blocked_by_pending_approval() {
    let mut ctx = permissive_ctx();
    ctx.approval_blocked = true;
    assert!(apply(QuotationStatus::Draft, QuotationEvent::Send, &ctx).is_err());
    assert!(apply(QuotationStatus::Sent, QuotationEvent::Resend, &ctx).is_err());
}

#[test]
fn client_events_require_a_valid_token() {
    let mut ctx = permissive_ctx();
    ctx.token_valid = false;
    assert!(apply(QuotationStatus::Sent, QuotationEvent::ClientView, &ctx).is_err());
    assert!(apply(
        QuotationStatus::Viewed,
        QuotationEvent::ClientRespond(ResponseType::Accepted),
        &ctx
    )
    .is_err());
}

#[test]
fn respond_rejected_when_a_response_exists() {
    let mut ctx = permissive_ctx();
    ctx.has_response = true;
    let err = apply(
        QuotationStatus::Viewed,
        QuotationEvent::ClientRespond(ResponseType::Rejected),
        &ctx,
    )
    .unwrap_err();
    match err {
        AppError::InvalidStateTransition { reason, .. } => {
            assert!(reason.contains("already"), "reason was: {reason}");
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[test]
fn auto_expire_waits_for_the_window_to_lapse() {
    // valid_until is today: not yet lapsed.
    let mut ctx = TransitionContext::new(date(2025, 3, 31), date(2025, 3, 31));
    ctx.token_valid = true;
    assert!(apply(QuotationStatus::Sent, QuotationEvent::AutoExpire, &ctx).is_err());

    ctx.today = date(2025, 4, 1);
    let outcome = apply(QuotationStatus::Viewed, QuotationEvent::AutoExpire, &ctx).unwrap();
    assert_eq!(outcome.to, QuotationStatus::Expired);
}
