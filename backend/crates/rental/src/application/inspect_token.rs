//! Inspect Token Use Case
//!
//! Read-only look at a scanned code so a scanner can show what it is about to
//! redeem. Never claims and never changes state.

use chrono::{DateTime, Utc};
use kernel::id::{CycleId, RentalId, UserId};
use std::sync::Arc;

use crate::domain::clock::Clock;
use crate::domain::entities::TokenPayload;
use crate::domain::qr::ScannedCode;
use crate::domain::repository::TokenRepository;
use crate::domain::services::remaining_ms;
use crate::domain::value_objects::{TokenId, TokenKind};
use crate::error::{RentalError, RentalResult};

/// Output DTO for inspect token
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub token: TokenId,
    pub kind: TokenKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_ms: i64,
    pub expired: bool,
    pub claimed: bool,
    pub cycle_id: Option<CycleId>,
    pub student_id: Option<UserId>,
    pub duration_minutes: Option<u32>,
    pub location: Option<String>,
    pub rental_id: Option<RentalId>,
}

/// Inspect Token Use Case
pub struct InspectTokenUseCase<T>
where
    T: TokenRepository,
{
    token_repo: Arc<T>,
    clock: Arc<dyn Clock>,
}

impl<T> InspectTokenUseCase<T>
where
    T: TokenRepository,
{
    pub fn new(token_repo: Arc<T>, clock: Arc<dyn Clock>) -> Self {
        Self { token_repo, clock }
    }

    pub async fn execute(&self, scanned: &str) -> RentalResult<TokenMetadata> {
        let scanned = ScannedCode::parse(scanned)?;
        let token = self
            .token_repo
            .find(&scanned.token_id)
            .await?
            .ok_or(RentalError::TokenNotFound)?;

        if let Some(declared) = scanned.declared_kind {
            if declared != token.kind() {
                return Err(RentalError::InvalidPayload(format!(
                    "QR code says {} but token is a {} token",
                    declared,
                    token.kind()
                )));
            }
        }

        let now = self.clock.now();
        let mut metadata = TokenMetadata {
            token: token.id.clone(),
            kind: token.kind(),
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            remaining_ms: remaining_ms(token.expires_at, now),
            expired: token.is_expired(now),
            claimed: token.is_claimed(),
            cycle_id: None,
            student_id: None,
            duration_minutes: None,
            location: None,
            rental_id: None,
        };

        match token.payload {
            TokenPayload::Rental(draft) => {
                metadata.cycle_id = Some(draft.cycle_id);
                metadata.student_id = Some(draft.student_id);
                metadata.duration_minutes = Some(draft.duration_minutes);
                metadata.location = Some(draft.location);
            }
            TokenPayload::Return { rental_id } => {
                metadata.rental_id = Some(rental_id);
            }
        }

        tracing::debug!(
            token = %metadata.token,
            kind = %metadata.kind,
            expired = metadata.expired,
            claimed = metadata.claimed,
            "Token inspected"
        );

        Ok(metadata)
    }
}
