//! Sweep runner: one tokio task per sweep.
//!
//! Fires are computed from the schedule (next top-of-hour, next daily hour)
//! rather than a fixed tick, so a slow run does not drift the schedule.
//! Unrecoverable sweep failures push the next fire out by an extended
//! backoff instead of hammering a broken query every cadence.

use crate::scheduler::sweeps::{Cadence, Sweep, SweepError};
use crate::services::metrics::{SWEEP_ITEMS_TOTAL, SWEEP_RUNS_TOTAL};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const UNRECOVERABLE_BACKOFF: Duration = Duration::from_secs(6 * 3600);

pub struct SchedulerRunner {
    sweeps: Vec<Arc<dyn Sweep>>,
    shutdown_token: CancellationToken,
}

impl SchedulerRunner {
    pub fn new(sweeps: Vec<Arc<dyn Sweep>>) -> Self {
        Self {
            sweeps,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Spawn one long-lived task per sweep. Returns immediately.
    pub fn start(&self) {
        for sweep in &self.sweeps {
            let sweep = sweep.clone();
            let shutdown = self.shutdown_token.clone();

            info!(sweep = sweep.name(), cadence = ?sweep.cadence(), "Scheduling sweep");

            tokio::spawn(async move {
                loop {
                    let now = Utc::now();
                    let wait = duration_until(next_fire(sweep.cadence(), now), now);

                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!(sweep = sweep.name(), "Sweep shutting down");
                            break;
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }

                    match sweep.run(Utc::now()).await {
                        Ok(outcome) => {
                            SWEEP_RUNS_TOTAL
                                .with_label_values(&[sweep.name(), "ok"])
                                .inc();
                            SWEEP_ITEMS_TOTAL
                                .with_label_values(&[sweep.name(), "processed"])
                                .inc_by(outcome.processed as f64);
                            SWEEP_ITEMS_TOTAL
                                .with_label_values(&[sweep.name(), "failed"])
                                .inc_by(outcome.failed as f64);

                            if outcome.matched == 0 {
                                debug!(sweep = sweep.name(), "Sweep found no matches");
                            } else {
                                info!(
                                    sweep = sweep.name(),
                                    matched = outcome.matched,
                                    processed = outcome.processed,
                                    failed = outcome.failed,
                                    "Sweep processed items"
                                );
                            }
                        }
                        Err(SweepError::Transient(e)) => {
                            SWEEP_RUNS_TOTAL
                                .with_label_values(&[sweep.name(), "transient_error"])
                                .inc();
                            error!(
                                sweep = sweep.name(),
                                error = %e,
                                "Sweep failed; waiting for next scheduled fire"
                            );
                        }
                        Err(SweepError::Unrecoverable(e)) => {
                            SWEEP_RUNS_TOTAL
                                .with_label_values(&[sweep.name(), "unrecoverable_error"])
                                .inc();
                            error!(
                                sweep = sweep.name(),
                                error = %e,
                                backoff_secs = UNRECOVERABLE_BACKOFF.as_secs(),
                                "Sweep failed unrecoverably; backing off"
                            );
                            tokio::select! {
                                _ = shutdown.cancelled() => {
                                    info!(sweep = sweep.name(), "Sweep shutting down");
                                    break;
                                }
                                _ = tokio::time::sleep(UNRECOVERABLE_BACKOFF) => {}
                            }
                        }
                    }
                }
            });
        }
    }

    pub fn shutdown(&self) {
        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();
    }
}

/// Next scheduled fire strictly after `now`.
pub fn next_fire(cadence: Cadence, now: DateTime<Utc>) -> DateTime<Utc> {
    match cadence {
        Cadence::Hourly => {
            let top = now
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now);
            top + ChronoDuration::hours(1)
        }
        Cadence::Daily { at_hour } => {
            let today_fire = now
                .with_hour(at_hour.min(23))
                .and_then(|t| t.with_minute(0))
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now);
            if today_fire > now {
                today_fire
            } else {
                today_fire + ChronoDuration::days(1)
            }
        }
    }
}

fn duration_until(fire: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (fire - now).to_std().unwrap_or(Duration::ZERO)
}
