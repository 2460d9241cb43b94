//! Expiry Sweeper
//!
//! Background pass that reaps unclaimed tokens and frees the cycles they held.
//! It also flags overdue rentals, frees reservations whose offer died after
//! being claimed, and purges old token tombstones. A failure on one
//! record is logged and the pass moves on.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::application::config::RentalConfig;
use crate::application::state_machine::RentalStateMachine;
use crate::domain::clock::Clock;
use crate::domain::repository::{RentalRepository, TokenRepository};

fn before(now: DateTime<Utc>, span: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Counts from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tokens_expired: usize,
    pub cycles_released: usize,
    pub rentals_marked_overdue: usize,
    pub tokens_deleted: u64,
    pub failures: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct ExpirySweeper<T, R>
where
    T: TokenRepository,
    R: RentalRepository,
{
    token_repo: Arc<T>,
    rental_repo: Arc<R>,
    state_machine: RentalStateMachine<R>,
    config: Arc<RentalConfig>,
    clock: Arc<dyn Clock>,
}

impl<T, R> ExpirySweeper<T, R>
where
    T: TokenRepository + Send + Sync + 'static,
    R: RentalRepository + Send + Sync + 'static,
{
    pub fn new(
        token_repo: Arc<T>,
        rental_repo: Arc<R>,
        config: Arc<RentalConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token_repo,
            state_machine: RentalStateMachine::new(rental_repo.clone()),
            rental_repo,
            config,
            clock,
        }
    }

    /// Run one pass at the current clock time
    pub async fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        match self.token_repo.discard_expired(now).await {
            Ok(expired) => {
                report.tokens_expired = expired.len();
                for token in &expired {
                    let Some(draft) = token.rental_draft() else {
                        continue;
                    };
                    match self.state_machine.release(draft.cycle_id, &token.id).await {
                        Ok(true) => report.cycles_released += 1,
                        Ok(false) => {}
                        Err(e) => {
                            report.failures += 1;
                            tracing::error!(
                                cycle_id = %draft.cycle_id,
                                token = %token.id,
                                error = %e,
                                "Sweeper failed to release cycle"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                report.failures += 1;
                tracing::error!(error = %e, "Sweeper failed to discard expired tokens");
            }
        }

        match self.rental_repo.find_past_due(now).await {
            Ok(past_due) => {
                for rental in &past_due {
                    match self.state_machine.mark_overdue(rental).await {
                        Ok(true) => report.rentals_marked_overdue += 1,
                        Ok(false) => {}
                        Err(e) => {
                            report.failures += 1;
                            tracing::error!(
                                rental_id = %rental.id,
                                error = %e,
                                "Sweeper failed to mark rental overdue"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                report.failures += 1;
                tracing::error!(error = %e, "Sweeper failed to list past-due rentals");
            }
        }

        // Claimed offers get one more lifetime to commit before their cycle is freed
        let stale_cutoff = before(now, self.config.token_ttl);
        match self.state_machine.release_stale(stale_cutoff).await {
            Ok(released) => report.cycles_released += released.len(),
            Err(e) => {
                report.failures += 1;
                tracing::error!(error = %e, "Sweeper failed to release stale reservations");
            }
        }

        let cutoff = before(now, self.config.token_retention);
        match self.token_repo.delete_expired_before(cutoff).await {
            Ok(deleted) => report.tokens_deleted = deleted,
            Err(e) => {
                report.failures += 1;
                tracing::error!(error = %e, "Sweeper failed to purge old tokens");
            }
        }

        if !report.is_empty() {
            tracing::info!(
                tokens_expired = report.tokens_expired,
                cycles_released = report.cycles_released,
                rentals_marked_overdue = report.rentals_marked_overdue,
                tokens_deleted = report.tokens_deleted,
                failures = report.failures,
                "Sweep completed"
            );
        }

        report
    }

    /// Sweep every `sweep_interval` until `shutdown` flips to true.
    ///
    /// The first tick fires immediately, which gives the startup pass.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "Expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }
}
