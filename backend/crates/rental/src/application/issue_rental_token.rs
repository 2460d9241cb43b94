//! Issue Rental Token Use Case
//!
//! A guard offers a cycle to a student. The cycle is reserved for the new
//! token right away, so no second offer can be made for it until the token is
//! redeemed or expires.

use crate::application::config::RentalConfig;
use crate::application::state_machine::RentalStateMachine;
use crate::domain::clock::Clock;
use crate::domain::entities::{QrToken, RentalDraft, TokenPayload};
use crate::domain::qr::QrPayload;
use crate::domain::repository::{DirectoryRepository, RentalRepository, TokenRepository};
use crate::domain::value_objects::{Actor, RentalDuration, TokenId};
use crate::error::{RentalError, RentalResult};
use kernel::id::{CycleId, UserId};
use std::sync::Arc;

/// Input DTO for issue rental token
#[derive(Debug, Clone)]
pub struct IssueRentalTokenInput {
    pub cycle_id: CycleId,
    pub student_id: UserId,
    pub duration_minutes: u32,
    pub location: String,
}

/// Output DTO shared by both issuance use cases
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: TokenId,
    pub expires_at_ms: i64,
    pub qr: QrPayload,
}

impl IssuedToken {
    pub(crate) fn from_token(token: &QrToken) -> Self {
        Self {
            token: token.id.clone(),
            expires_at_ms: token.expires_at.timestamp_millis(),
            qr: QrPayload::for_token(token),
        }
    }
}

/// Issue Rental Token Use Case
pub struct IssueRentalTokenUseCase<T, D, R>
where
    T: TokenRepository,
    D: DirectoryRepository,
    R: RentalRepository,
{
    token_repo: Arc<T>,
    directory_repo: Arc<D>,
    rental_repo: Arc<R>,
    state_machine: RentalStateMachine<R>,
    config: Arc<RentalConfig>,
    clock: Arc<dyn Clock>,
}

impl<T, D, R> IssueRentalTokenUseCase<T, D, R>
where
    T: TokenRepository,
    D: DirectoryRepository,
    R: RentalRepository,
{
    pub fn new(
        token_repo: Arc<T>,
        directory_repo: Arc<D>,
        rental_repo: Arc<R>,
        config: Arc<RentalConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token_repo,
            directory_repo,
            state_machine: RentalStateMachine::new(rental_repo.clone()),
            rental_repo,
            config,
            clock,
        }
    }

    pub async fn execute(
        &self,
        input: IssueRentalTokenInput,
        issuer: Actor,
    ) -> RentalResult<IssuedToken> {
        if !issuer.role.can_issue_rentals() {
            return Err(RentalError::Forbidden(format!(
                "role {} cannot issue rental tokens",
                issuer.role
            )));
        }

        let duration = RentalDuration::new(input.duration_minutes, self.config.max_rental_minutes)
            .ok_or(RentalError::InvalidDuration {
                minutes: input.duration_minutes,
                max: self.config.max_rental_minutes,
            })?;

        let location = input.location.trim();
        if location.is_empty() {
            return Err(RentalError::InvalidPayload(
                "location is required".to_string(),
            ));
        }

        // Student eligibility
        let student = self
            .directory_repo
            .find_student(input.student_id)
            .await?
            .ok_or(RentalError::StudentNotFound)?;

        if student.exceeds_fine_ceiling(self.config.fine_ceiling) {
            return Err(RentalError::FineLimitExceeded {
                outstanding: student.outstanding_fine,
                ceiling: self.config.fine_ceiling,
            });
        }

        if self
            .rental_repo
            .find_open_rental_for_student(student.id)
            .await?
            .is_some()
        {
            return Err(RentalError::StudentHasOpenRental);
        }

        // Cycle availability
        let cycle = self
            .directory_repo
            .find_cycle(input.cycle_id)
            .await?
            .ok_or(RentalError::CycleNotFound)?;

        if !cycle.is_reservable() {
            return Err(RentalError::CycleNotAvailable);
        }

        let draft = RentalDraft {
            cycle_id: cycle.id,
            student_id: student.id,
            guard_id: issuer.id,
            duration_minutes: duration.minutes(),
            location: location.to_string(),
        };
        let token = QrToken::issue(
            TokenPayload::Rental(draft),
            self.clock.now(),
            self.config.token_ttl,
        );

        // The availability read above may be stale; the reservation is the real guard
        if !self.state_machine.try_reserve(cycle.id, &token.id).await? {
            return Err(RentalError::CycleNotAvailable);
        }

        if let Err(e) = self.token_repo.create(&token).await {
            if let Err(release_err) = self.state_machine.release(cycle.id, &token.id).await {
                tracing::error!(
                    cycle_id = %cycle.id,
                    error = %release_err,
                    "Failed to release cycle after token store error"
                );
            }
            return Err(e);
        }

        tracing::info!(
            token = %token.id,
            cycle_id = %cycle.id,
            student_id = %student.id,
            guard_id = %issuer.id,
            duration_minutes = duration.minutes(),
            expires_at = %token.expires_at,
            "Issued rental token"
        );

        Ok(IssuedToken::from_token(&token))
    }
}
