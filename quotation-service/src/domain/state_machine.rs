//! Quotation status state machine.
//!
//! The transition table is data: each entry names the source statuses, the
//! event kind, a guard predicate over the transition context, and the
//! target status. Applying an event either yields the table-defined
//! target or fails with `AppError::InvalidStateTransition` naming the
//! current status, the event and the reason. There is no silent no-op.

use crate::models::{QuotationStatus, ResponseType};
use chrono::NaiveDate;
use service_core::error::AppError;

/// Lifecycle event fired against a quotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotationEvent {
    Send,
    Resend,
    ClientView,
    ClientRespond(ResponseType),
    Delete,
    AutoExpire,
}

impl QuotationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationEvent::Send => "send",
            QuotationEvent::Resend => "resend",
            QuotationEvent::ClientView => "client_view",
            QuotationEvent::ClientRespond(ResponseType::Accepted) => "client_respond_accept",
            QuotationEvent::ClientRespond(ResponseType::Rejected) => "client_respond_reject",
            QuotationEvent::Delete => "delete",
            QuotationEvent::AutoExpire => "auto_expire",
        }
    }

    fn kind(&self) -> EventKind {
        match self {
            QuotationEvent::Send => EventKind::Send,
            QuotationEvent::Resend => EventKind::Resend,
            QuotationEvent::ClientView => EventKind::ClientView,
            QuotationEvent::ClientRespond(_) => EventKind::ClientRespond,
            QuotationEvent::Delete => EventKind::Delete,
            QuotationEvent::AutoExpire => EventKind::AutoExpire,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Send,
    Resend,
    ClientView,
    ClientRespond,
    Delete,
    AutoExpire,
}

/// Everything a guard may inspect. Time is injected, never ambient.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    pub line_item_count: usize,
    pub approval_blocked: bool,
    pub token_valid: bool,
    pub has_response: bool,
    pub valid_until: NaiveDate,
    pub today: NaiveDate,
}

impl TransitionContext {
    /// Baseline context: all guard inputs at their most restrictive, the
    /// caller opts in to what it has verified.
    pub fn new(valid_until: NaiveDate, today: NaiveDate) -> Self {
        Self {
            line_item_count: 0,
            approval_blocked: false,
            token_valid: false,
            has_response: false,
            valid_until,
            today,
        }
    }
}

/// Result of a legal event application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: QuotationStatus,
    pub to: QuotationStatus,
    /// False for count-only repeat views (Viewed + ClientView): the
    /// status is unchanged and no history entry is owed.
    pub changed: bool,
}

type Guard = fn(&TransitionContext) -> Result<(), &'static str>;

struct Transition {
    from: &'static [QuotationStatus],
    event: EventKind,
    guard: Guard,
    target: fn(&QuotationEvent) -> QuotationStatus,
}

fn guard_send(ctx: &TransitionContext) -> Result<(), &'static str> {
    if ctx.line_item_count == 0 {
        return Err("quotation has no line items");
    }
    if ctx.approval_blocked {
        return Err("a pending discount approval blocks sending");
    }
    Ok(())
}

fn guard_token(ctx: &TransitionContext) -> Result<(), &'static str> {
    if !ctx.token_valid {
        return Err("access token is invalid, inactive or expired");
    }
    Ok(())
}

fn guard_respond(ctx: &TransitionContext) -> Result<(), &'static str> {
    guard_token(ctx)?;
    if ctx.has_response {
        return Err("a response has already been recorded");
    }
    Ok(())
}

fn guard_none(_ctx: &TransitionContext) -> Result<(), &'static str> {
    Ok(())
}

fn guard_expired(ctx: &TransitionContext) -> Result<(), &'static str> {
    if ctx.valid_until >= ctx.today {
        return Err("validity window has not lapsed");
    }
    Ok(())
}

fn target_respond(event: &QuotationEvent) -> QuotationStatus {
    match event {
        QuotationEvent::ClientRespond(ResponseType::Accepted) => QuotationStatus::Accepted,
        _ => QuotationStatus::Rejected,
    }
}

const TRANSITIONS: &[Transition] = &[
    Transition {
        from: &[QuotationStatus::Draft],
        event: EventKind::Send,
        guard: guard_send,
        target: |_| QuotationStatus::Sent,
    },
    Transition {
        from: &[QuotationStatus::Sent],
        event: EventKind::Resend,
        guard: guard_send,
        target: |_| QuotationStatus::Sent,
    },
    Transition {
        from: &[QuotationStatus::Sent, QuotationStatus::Viewed],
        event: EventKind::ClientView,
        guard: guard_token,
        target: |_| QuotationStatus::Viewed,
    },
    Transition {
        from: &[QuotationStatus::Sent, QuotationStatus::Viewed],
        event: EventKind::ClientRespond,
        guard: guard_respond,
        target: target_respond,
    },
    Transition {
        from: &[
            QuotationStatus::Draft,
            QuotationStatus::Sent,
            QuotationStatus::Viewed,
        ],
        event: EventKind::Delete,
        guard: guard_none,
        target: |_| QuotationStatus::Cancelled,
    },
    Transition {
        from: &[QuotationStatus::Sent, QuotationStatus::Viewed],
        event: EventKind::AutoExpire,
        guard: guard_expired,
        target: |_| QuotationStatus::Expired,
    },
];

/// Apply `event` to `current` under `ctx`.
pub fn apply(
    current: QuotationStatus,
    event: QuotationEvent,
    ctx: &TransitionContext,
) -> Result<TransitionOutcome, AppError> {
    let entry = TRANSITIONS
        .iter()
        .find(|t| t.event == event.kind() && t.from.contains(&current));

    let entry = match entry {
        Some(e) => e,
        None => {
            let reason = if current.is_terminal() {
                format!("{} is a terminal status", current)
            } else {
                format!("{} is not legal from {}", event.as_str(), current)
            };
            return Err(AppError::InvalidStateTransition {
                current: current.as_str().to_string(),
                event: event.as_str().to_string(),
                reason,
            });
        }
    };

    (entry.guard)(ctx).map_err(|reason| AppError::InvalidStateTransition {
        current: current.as_str().to_string(),
        event: event.as_str().to_string(),
        reason: reason.to_string(),
    })?;

    let to = (entry.target)(&event);
    Ok(TransitionOutcome {
        from: current,
        to,
        changed: to != current,
    })
}
