//! Domain Entities
//!
//! Core business entities for the rental domain.

use chrono::{DateTime, Utc};
use kernel::id::{CycleId, Id, RentalId, UserId};

use crate::domain::services::{self, FinePolicy};
use crate::domain::value_objects::{CycleStatus, RentalStatus, TokenId, TokenKind};

/// A physical cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub id: CycleId,
    pub status: CycleStatus,
    pub current_location: String,
    pub battery_level: Option<u8>,
    /// Unclaimed rental token currently holding the reservation
    pub pending_token: Option<TokenId>,
}

impl Cycle {
    /// A cycle as admin provisioning would create it
    pub fn provisioned(id: CycleId, location: impl Into<String>) -> Self {
        Self {
            id,
            status: CycleStatus::Available,
            current_location: location.into(),
            battery_level: None,
            pending_token: None,
        }
    }

    pub fn is_reservable(&self) -> bool {
        self.status == CycleStatus::Available && self.pending_token.is_none()
    }

    pub fn is_reserved_by(&self, token_id: &TokenId) -> bool {
        self.status == CycleStatus::Reserved && self.pending_token.as_ref() == Some(token_id)
    }
}

/// Student as seen through the user directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: UserId,
    /// Sum of fines from past returns not yet settled at the office
    pub outstanding_fine: i64,
}

impl Student {
    pub fn new(id: UserId, outstanding_fine: i64) -> Self {
        Self {
            id,
            outstanding_fine,
        }
    }

    pub fn exceeds_fine_ceiling(&self, ceiling: i64) -> bool {
        self.outstanding_fine > ceiling
    }
}

/// Parameters of a rental that does not exist yet.
///
/// Captured in a rental token at issuance and committed on redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalDraft {
    pub cycle_id: CycleId,
    pub student_id: UserId,
    pub guard_id: UserId,
    pub duration_minutes: u32,
    pub location: String,
}

/// Rental entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rental {
    pub id: RentalId,
    pub student_id: UserId,
    pub cycle_id: CycleId,
    pub guard_id: UserId,
    pub location: String,
    pub duration_minutes: u32,
    pub start_time: DateTime<Utc>,
    pub expected_return_time: DateTime<Utc>,
    pub actual_return_time: Option<DateTime<Utc>>,
    pub status: RentalStatus,
    /// Frozen at return; 0 while open
    pub fine: i64,
}

impl Rental {
    /// Start a rental from a draft at `now`
    pub fn start(draft: RentalDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Id::new(),
            student_id: draft.student_id,
            cycle_id: draft.cycle_id,
            guard_id: draft.guard_id,
            location: draft.location,
            duration_minutes: draft.duration_minutes,
            start_time: now,
            expected_return_time: services::expected_return_time(now, draft.duration_minutes),
            actual_return_time: None,
            status: RentalStatus::Active,
            fine: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Still `active` although the expected return time has passed
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RentalStatus::Active && now > self.expected_return_time
    }
}

/// What a token authorizes, validated once and carried as a tagged union
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPayload {
    Rental(RentalDraft),
    Return { rental_id: RentalId },
}

impl TokenPayload {
    pub fn kind(&self) -> TokenKind {
        match self {
            TokenPayload::Rental(_) => TokenKind::Rental,
            TokenPayload::Return { .. } => TokenKind::Return,
        }
    }
}

/// Short-lived, single-use QR token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrToken {
    pub id: TokenId,
    pub payload: TokenPayload,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Set when an expired token is reaped; the record stays as a tombstone
    /// until the retention window passes
    pub discarded_at: Option<DateTime<Utc>>,
}

impl QrToken {
    /// Issue a new token with a fresh random ID
    pub fn issue(payload: TokenPayload, now: DateTime<Utc>, ttl: std::time::Duration) -> Self {
        Self {
            id: TokenId::generate(),
            payload,
            issued_at: now,
            expires_at: services::expires_at(now, ttl),
            claimed_at: None,
            discarded_at: None,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.payload.kind()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        services::is_expired(self.expires_at, now)
    }

    /// Reservation-holding rental draft, if this is a rental token
    pub fn rental_draft(&self) -> Option<&RentalDraft> {
        match &self.payload {
            TokenPayload::Rental(draft) => Some(draft),
            TokenPayload::Return { .. } => None,
        }
    }
}

/// Result of an atomic claim attempt.
///
/// Stores decide the outcome inside a single atomic step; the order of checks
/// is: absent, expired, already claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller won the claim
    Claimed(QrToken),
    NotFound,
    /// Past expiry; the store has tombstoned it
    Expired(QrToken),
    AlreadyClaimed(QrToken),
}

/// Receipt of a completed return. Rebuilt from the stored rental, so
/// regenerating it later yields identical figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnReceipt {
    pub rental_id: RentalId,
    pub cycle_id: CycleId,
    pub student_id: UserId,
    pub duration_minutes: u32,
    pub actual_duration_minutes: i64,
    pub overtime_minutes: i64,
    pub fine: i64,
    pub start_time: DateTime<Utc>,
    pub expected_return_time: DateTime<Utc>,
    pub actual_return_time: DateTime<Utc>,
}

impl ReturnReceipt {
    /// `None` unless the rental has been returned
    pub fn from_returned(rental: &Rental) -> Option<Self> {
        let actual_return_time = rental.actual_return_time?;
        if rental.status != RentalStatus::Returned {
            return None;
        }
        Some(Self {
            rental_id: rental.id,
            cycle_id: rental.cycle_id,
            student_id: rental.student_id,
            duration_minutes: rental.duration_minutes,
            actual_duration_minutes: services::minutes_ceil(rental.start_time, actual_return_time),
            overtime_minutes: services::overtime_minutes(
                rental.expected_return_time,
                actual_return_time,
            ),
            fine: rental.fine,
            start_time: rental.start_time,
            expected_return_time: rental.expected_return_time,
            actual_return_time,
        })
    }

    /// Whether the frozen fine matches what `policy` yields for the stored times
    pub fn is_consistent_with(&self, policy: &FinePolicy) -> bool {
        policy
            .assess(self.expected_return_time, self.actual_return_time)
            .amount
            == self.fine
    }

    /// SHA-256 over the canonical receipt fields, base64url encoded.
    ///
    /// Lets an auditor check that a regenerated receipt matches the one handed
    /// out at the counter.
    pub fn digest(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.rental_id,
            self.cycle_id,
            self.student_id,
            self.duration_minutes,
            self.start_time.timestamp_millis(),
            self.expected_return_time.timestamp_millis(),
            self.actual_return_time.timestamp_millis(),
            self.fine,
        );
        platform::crypto::to_base64url(&platform::crypto::sha256(canonical.as_bytes()))
    }
}
