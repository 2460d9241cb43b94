//! Get Receipt Use Case

use crate::application::config::RentalConfig;
use crate::domain::entities::ReturnReceipt;
use crate::domain::repository::RentalRepository;
use crate::domain::value_objects::Actor;
use crate::error::{RentalError, RentalResult};
use kernel::id::RentalId;
use std::sync::Arc;

/// Regenerates the receipt of a returned rental from the stored record.
pub struct GetReceiptUseCase<R>
where
    R: RentalRepository,
{
    rental_repo: Arc<R>,
    config: Arc<RentalConfig>,
}

impl<R> GetReceiptUseCase<R>
where
    R: RentalRepository,
{
    pub fn new(rental_repo: Arc<R>, config: Arc<RentalConfig>) -> Self {
        Self {
            rental_repo,
            config,
        }
    }

    pub async fn execute(&self, rental_id: RentalId, requester: Actor) -> RentalResult<ReturnReceipt> {
        let rental = self
            .rental_repo
            .find_rental(rental_id)
            .await?
            .ok_or(RentalError::RentalNotFound)?;

        // Guards look up receipts at the gate; students only see their own
        if !requester.role.can_accept_returns() && !requester.acts_for_student(rental.student_id) {
            tracing::warn!(
                rental_id = %rental_id,
                requester = %requester.id,
                "Receipt requested by another student"
            );
            return Err(RentalError::Forbidden(
                "receipt belongs to another student".to_string(),
            ));
        }

        // Open rentals have no receipt yet
        let receipt = ReturnReceipt::from_returned(&rental).ok_or(RentalError::RentalNotFound)?;

        // The frozen fine always wins; a mismatch means the policy changed since
        if !receipt.is_consistent_with(&self.config.fine_policy()) {
            tracing::warn!(
                rental_id = %rental_id,
                fine = receipt.fine,
                overtime_minutes = receipt.overtime_minutes,
                "Frozen fine differs from current fine policy"
            );
        }

        Ok(receipt)
    }
}
