//! Redeem Token Use Case
//!
//! Scanning a QR code. The atomic claim is the single synchronization point:
//! of any number of concurrent redeemers, exactly one proceeds to commit.

use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;

use crate::application::config::RentalConfig;
use crate::application::state_machine::RentalStateMachine;
use crate::domain::clock::Clock;
use crate::domain::entities::{
    ClaimOutcome, QrToken, Rental, RentalDraft, ReturnReceipt, TokenPayload,
};
use crate::domain::qr::ScannedCode;
use crate::domain::repository::{DirectoryRepository, RentalRepository, TokenRepository};
use crate::domain::value_objects::{Actor, TokenId, TokenKind};
use crate::error::{RentalError, RentalResult};
use kernel::id::RentalId;

/// Input DTO for redeem token
#[derive(Debug, Clone)]
pub struct RedeemInput {
    /// Raw scanner output: a bare token or the JSON QR object
    pub scanned: String,
    /// Kind the endpoint accepts; `None` accepts either
    pub expected_kind: Option<TokenKind>,
    pub redeemer: Actor,
    /// Where a returned cycle is dropped off; defaults to the rental location
    pub return_location: Option<String>,
}

/// Output DTO for redeem token
#[derive(Debug, Clone)]
pub enum RedeemOutput {
    RentalStarted(Rental),
    RentalReturned(ReturnReceipt),
}

/// Redeem Token Use Case
pub struct RedeemTokenUseCase<T, D, R>
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

impl<T, D, R> RedeemTokenUseCase<T, D, R>
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

    pub async fn execute(&self, input: RedeemInput) -> RentalResult<RedeemOutput> {
        let scanned = ScannedCode::parse(&input.scanned)?;
        // Storage keeps microseconds; receipts rebuilt from rows must see the same instant
        let now = self.clock.now().trunc_subsecs(6);

        let token = self
            .token_repo
            .find(&scanned.token_id)
            .await?
            .ok_or(RentalError::TokenNotFound)?;

        check_kind(&token, scanned.declared_kind, input.expected_kind)?;

        // Expired tokens report Expired to everyone; the claim below tombstones them
        if !token.is_expired(now) {
            authorize(&token, &input.redeemer)?;
        }

        match self.token_repo.claim(&token.id, now).await? {
            ClaimOutcome::NotFound => Err(RentalError::TokenNotFound),
            ClaimOutcome::Expired(expired) => {
                tracing::info!(token = %expired.id, kind = %expired.kind(), "Redemption of expired token");
                if let Some(draft) = expired.rental_draft() {
                    self.state_machine
                        .release(draft.cycle_id, &expired.id)
                        .await?;
                }
                Err(RentalError::TokenExpired)
            }
            ClaimOutcome::AlreadyClaimed(_) => Err(RentalError::TokenAlreadyClaimed),
            ClaimOutcome::Claimed(claimed) => {
                tracing::info!(
                    token = %claimed.id,
                    kind = %claimed.kind(),
                    redeemer = %input.redeemer.id,
                    "Token claimed"
                );
                match claimed.payload {
                    TokenPayload::Rental(draft) => self
                        .start_rental(draft, &claimed.id, now)
                        .await
                        .map(RedeemOutput::RentalStarted),
                    TokenPayload::Return { rental_id } => self
                        .finish_return(rental_id, input.return_location, now)
                        .await
                        .map(RedeemOutput::RentalReturned),
                }
            }
        }
    }

    /// Re-validate and commit; on any failure hand the cycle back
    async fn start_rental(
        &self,
        draft: RentalDraft,
        token_id: &TokenId,
        now: DateTime<Utc>,
    ) -> RentalResult<Rental> {
        let cycle_id = draft.cycle_id;
        match self.revalidate_and_commit(draft, token_id, now).await {
            Ok(rental) => Ok(rental),
            Err(e) => {
                tracing::warn!(
                    cycle_id = %cycle_id,
                    token = %token_id,
                    error = %e,
                    "Rental commit failed, releasing reservation"
                );
                if let Err(release_err) = self.state_machine.release(cycle_id, token_id).await {
                    tracing::error!(
                        cycle_id = %cycle_id,
                        error = %release_err,
                        "Failed to release cycle after commit failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn revalidate_and_commit(
        &self,
        draft: RentalDraft,
        token_id: &TokenId,
        now: DateTime<Utc>,
    ) -> RentalResult<Rental> {
        let student = self
            .directory_repo
            .find_student(draft.student_id)
            .await?
            .ok_or(RentalError::StudentNotFound)?;

        // Fines may have grown since issuance
        if student.exceeds_fine_ceiling(self.config.fine_ceiling) {
            return Err(RentalError::FineLimitExceeded {
                outstanding: student.outstanding_fine,
                ceiling: self.config.fine_ceiling,
            });
        }

        self.state_machine.commit(draft, token_id, now).await
    }

    async fn finish_return(
        &self,
        rental_id: RentalId,
        return_location: Option<String>,
        now: DateTime<Utc>,
    ) -> RentalResult<ReturnReceipt> {
        let rental = self
            .rental_repo
            .find_rental(rental_id)
            .await?
            .ok_or(RentalError::RentalNotFound)?;

        if !rental.is_open() {
            return Err(RentalError::RentalAlreadyReturned);
        }

        let assessment = self
            .config
            .fine_policy()
            .assess(rental.expected_return_time, now);

        let location = return_location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| rental.location.clone());

        let returned = self
            .state_machine
            .complete_return(&rental, assessment.amount, now, &location)
            .await?;

        ReturnReceipt::from_returned(&returned)
            .ok_or_else(|| RentalError::Internal("returned rental has no return time".to_string()))
    }
}

fn check_kind(
    token: &QrToken,
    declared: Option<TokenKind>,
    expected: Option<TokenKind>,
) -> RentalResult<()> {
    let actual = token.kind();
    if let Some(declared) = declared {
        if declared != actual {
            return Err(RentalError::InvalidPayload(format!(
                "QR code says {} but token is a {} token",
                declared, actual
            )));
        }
    }
    if let Some(expected) = expected {
        if expected != actual {
            return Err(RentalError::InvalidPayload(format!(
                "expected a {} token, got a {} token",
                expected, actual
            )));
        }
    }
    Ok(())
}

/// Rental tokens belong to the student they were issued for; return tokens
/// are scanned by gate staff.
fn authorize(token: &QrToken, redeemer: &Actor) -> RentalResult<()> {
    match &token.payload {
        TokenPayload::Rental(draft) if !redeemer.acts_for_student(draft.student_id) => Err(
            RentalError::Forbidden("rental token was issued to another student".to_string()),
        ),
        TokenPayload::Return { .. } if !redeemer.role.can_accept_returns() => Err(
            RentalError::Forbidden(format!("role {} cannot accept returns", redeemer.role)),
        ),
        _ => Ok(()),
    }
}
