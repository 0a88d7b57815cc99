pub mod runner;
pub mod sweeps;

pub use runner::SchedulerRunner;
pub use sweeps::{
    ApprovalEscalationSweep, Cadence, ExpirationSweep, PendingResponseFollowUpSweep, Sweep,
    SweepOutcome, UnviewedReminderSweep,
};
