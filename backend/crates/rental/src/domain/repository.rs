//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in the infra layer.
//! Every mutating method is a single atomic storage step guarded by the
//! current state, so callers never observe a half-applied transition.

use chrono::{DateTime, Utc};
use kernel::id::{CycleId, RentalId, UserId};

use crate::domain::entities::{ClaimOutcome, Cycle, QrToken, Rental, Student};
use crate::domain::value_objects::TokenId;
use crate::error::RentalResult;

/// Token store
#[trait_variant::make(TokenRepository: Send)]
pub trait LocalTokenRepository {
    /// Persist a freshly issued token
    async fn create(&self, token: &QrToken) -> RentalResult<()>;

    /// Read a token without claiming it
    async fn find(&self, token_id: &TokenId) -> RentalResult<Option<QrToken>>;

    /// Atomically claim a token (set claimed only if currently unclaimed).
    ///
    /// Exactly one concurrent caller can receive `Claimed` for a given token.
    /// An expired token is tombstoned and reported as `Expired`.
    async fn claim(&self, token_id: &TokenId, now: DateTime<Utc>) -> RentalResult<ClaimOutcome>;

    /// Tombstone unclaimed tokens that expired before `now` and return them
    async fn discard_expired(&self, now: DateTime<Utc>) -> RentalResult<Vec<QrToken>>;

    /// Delete tokens (claimed or not) that expired before `cutoff`
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> RentalResult<u64>;
}

/// User/cycle directory lookups (records owned by admin provisioning)
#[trait_variant::make(DirectoryRepository: Send)]
pub trait LocalDirectoryRepository {
    async fn find_cycle(&self, cycle_id: CycleId) -> RentalResult<Option<Cycle>>;

    async fn find_student(&self, student_id: UserId) -> RentalResult<Option<Student>>;
}

/// Cycle/rental state.
///
/// Only the rental state machine calls the mutating methods.
#[trait_variant::make(RentalRepository: Send)]
pub trait LocalRentalRepository {
    async fn find_rental(&self, rental_id: RentalId) -> RentalResult<Option<Rental>>;

    /// The student's `active` or `overdue` rental, if any
    async fn find_open_rental_for_student(&self, student_id: UserId)
    -> RentalResult<Option<Rental>>;

    /// `active` rentals whose expected return time is before `now`
    async fn find_past_due(&self, now: DateTime<Utc>) -> RentalResult<Vec<Rental>>;

    /// `available` (no pending token) → `reserved` by `token_id`. False if the guard fails.
    async fn reserve_cycle(&self, cycle_id: CycleId, token_id: &TokenId) -> RentalResult<bool>;

    /// `reserved` by `token_id` → `available`. False if reserved by anything else.
    async fn release_cycle(&self, cycle_id: CycleId, token_id: &TokenId) -> RentalResult<bool>;

    /// `reserved` → `available` for every cycle whose pending token expired
    /// before `cutoff` or no longer exists, claimed or not.
    async fn release_stale_reservations(&self, cutoff: DateTime<Utc>)
    -> RentalResult<Vec<CycleId>>;

    /// Insert `rental` and move its cycle `reserved` by `token_id` → `rented`.
    ///
    /// Fails with `CycleNotReserved`, `StudentHasOpenRental` or
    /// `CycleHasOpenRental` without changing anything.
    async fn commit_rental(&self, rental: &Rental, token_id: &TokenId) -> RentalResult<()>;

    /// `active` → `overdue`. False if the rental is not `active`.
    async fn mark_overdue(&self, rental_id: RentalId) -> RentalResult<bool>;

    /// Open rental → `returned` with the fine frozen; cycle `rented` →
    /// `available` at `location`; fine added to the student's balance.
    ///
    /// Fails with `RentalAlreadyReturned` if another return won.
    async fn complete_return(
        &self,
        rental_id: RentalId,
        fine: i64,
        returned_at: DateTime<Utc>,
        location: &str,
    ) -> RentalResult<Rental>;
}

/// Everything the HTTP layer needs from one storage handle
pub trait RentalStore:
    TokenRepository + DirectoryRepository + RentalRepository + Clone + Send + Sync + 'static
{
}

impl<S> RentalStore for S where
    S: TokenRepository + DirectoryRepository + RentalRepository + Clone + Send + Sync + 'static
{
}
