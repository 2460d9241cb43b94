//! Rental State Machine
//!
//! The only component that mutates cycle and rental status. Each operation is
//! one conditional write in the repository; this layer adds the transition
//! rules that can be checked up front and the audit logging.

use chrono::{DateTime, Utc};
use kernel::id::CycleId;
use std::sync::Arc;

use crate::domain::entities::{Rental, RentalDraft};
use crate::domain::repository::RentalRepository;
use crate::domain::value_objects::{RentalStatus, TokenId};
use crate::error::{RentalError, RentalResult};

pub struct RentalStateMachine<R>
where
    R: RentalRepository,
{
    repo: Arc<R>,
}

impl<R> Clone for RentalStateMachine<R>
where
    R: RentalRepository,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<R> RentalStateMachine<R>
where
    R: RentalRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// `available → reserved`, holding `token_id` as the pending offer
    pub async fn try_reserve(&self, cycle_id: CycleId, token_id: &TokenId) -> RentalResult<bool> {
        let reserved = self.repo.reserve_cycle(cycle_id, token_id).await?;
        if reserved {
            tracing::info!(cycle_id = %cycle_id, token = %token_id, "Cycle reserved");
        } else {
            tracing::warn!(cycle_id = %cycle_id, "Cycle reservation refused");
        }
        Ok(reserved)
    }

    /// `reserved → available`, only if still reserved by `token_id`
    pub async fn release(&self, cycle_id: CycleId, token_id: &TokenId) -> RentalResult<bool> {
        let released = self.repo.release_cycle(cycle_id, token_id).await?;
        if released {
            tracing::info!(cycle_id = %cycle_id, token = %token_id, "Cycle released");
        }
        Ok(released)
    }

    /// `reserved → available` for cycles left holding a dead offer
    pub async fn release_stale(&self, cutoff: DateTime<Utc>) -> RentalResult<Vec<CycleId>> {
        let released = self.repo.release_stale_reservations(cutoff).await?;
        for cycle_id in &released {
            tracing::warn!(cycle_id = %cycle_id, "Stale cycle reservation released");
        }
        Ok(released)
    }

    /// Create the rental and move the cycle `reserved → rented`
    pub async fn commit(
        &self,
        draft: RentalDraft,
        token_id: &TokenId,
        now: DateTime<Utc>,
    ) -> RentalResult<Rental> {
        let rental = Rental::start(draft, now);
        self.repo.commit_rental(&rental, token_id).await?;

        tracing::info!(
            rental_id = %rental.id,
            cycle_id = %rental.cycle_id,
            student_id = %rental.student_id,
            guard_id = %rental.guard_id,
            duration_minutes = rental.duration_minutes,
            expected_return_time = %rental.expected_return_time,
            "Rental started"
        );

        Ok(rental)
    }

    /// `active → overdue`
    pub async fn mark_overdue(&self, rental: &Rental) -> RentalResult<bool> {
        if !rental.status.can_transition_to(RentalStatus::Overdue) {
            return Ok(false);
        }
        let marked = self.repo.mark_overdue(rental.id).await?;
        if marked {
            tracing::info!(
                rental_id = %rental.id,
                student_id = %rental.student_id,
                expected_return_time = %rental.expected_return_time,
                "Rental marked overdue"
            );
        }
        Ok(marked)
    }

    /// `active|overdue → returned` with the fine frozen; cycle back to `available`
    pub async fn complete_return(
        &self,
        rental: &Rental,
        fine: i64,
        returned_at: DateTime<Utc>,
        location: &str,
    ) -> RentalResult<Rental> {
        if !rental.status.can_transition_to(RentalStatus::Returned) {
            return Err(RentalError::RentalAlreadyReturned);
        }

        let returned = self
            .repo
            .complete_return(rental.id, fine, returned_at, location)
            .await?;

        tracing::info!(
            rental_id = %returned.id,
            cycle_id = %returned.cycle_id,
            student_id = %returned.student_id,
            fine = returned.fine,
            location = %location,
            "Rental returned"
        );

        Ok(returned)
    }
}
