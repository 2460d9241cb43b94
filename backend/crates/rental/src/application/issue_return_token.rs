//! Issue Return Token Use Case

use crate::application::config::RentalConfig;
use crate::application::issue_rental_token::IssuedToken;
use crate::domain::clock::Clock;
use crate::domain::entities::{QrToken, TokenPayload};
use crate::domain::repository::{RentalRepository, TokenRepository};
use crate::domain::value_objects::Actor;
use crate::error::{RentalError, RentalResult};
use kernel::id::RentalId;
use std::sync::Arc;

/// Issue Return Token Use Case
///
/// Nothing changes state here; the return happens when a guard redeems the token.
pub struct IssueReturnTokenUseCase<T, R>
where
    T: TokenRepository,
    R: RentalRepository,
{
    token_repo: Arc<T>,
    rental_repo: Arc<R>,
    config: Arc<RentalConfig>,
    clock: Arc<dyn Clock>,
}

impl<T, R> IssueReturnTokenUseCase<T, R>
where
    T: TokenRepository,
    R: RentalRepository,
{
    pub fn new(
        token_repo: Arc<T>,
        rental_repo: Arc<R>,
        config: Arc<RentalConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token_repo,
            rental_repo,
            config,
            clock,
        }
    }

    pub async fn execute(&self, rental_id: RentalId, requester: Actor) -> RentalResult<IssuedToken> {
        let rental = self
            .rental_repo
            .find_rental(rental_id)
            .await?
            .ok_or(RentalError::RentalNotFound)?;

        if !requester.acts_for_student(rental.student_id) {
            return Err(RentalError::Forbidden(
                "only the renting student can request a return".to_string(),
            ));
        }

        if !rental.is_open() {
            return Err(RentalError::RentalAlreadyReturned);
        }

        let token = QrToken::issue(
            TokenPayload::Return {
                rental_id: rental.id,
            },
            self.clock.now(),
            self.config.token_ttl,
        );
        self.token_repo.create(&token).await?;

        tracing::info!(
            token = %token.id,
            rental_id = %rental.id,
            student_id = %rental.student_id,
            expires_at = %token.expires_at,
            "Issued return token"
        );

        Ok(IssuedToken::from_token(&token))
    }
}
