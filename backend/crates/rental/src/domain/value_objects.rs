//! Domain Value Objects
//!
//! Immutable value types for the rental domain.

use kernel::id::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Cycle status
// ============================================================================

/// Lifecycle of a physical cycle.
///
/// ```text
/// available --reserve--> reserved --commit--> rented --return--> available
/// reserved --release--> available
/// any --admin--> maintenance | disabled --admin--> available
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Available,
    Reserved,
    Rented,
    Maintenance,
    Disabled,
}

impl CycleStatus {
    #[inline]
    pub const fn code(&self) -> &'static str {
        use CycleStatus::*;
        match self {
            Available => "available",
            Reserved => "reserved",
            Rented => "rented",
            Maintenance => "maintenance",
            Disabled => "disabled",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        use CycleStatus::*;
        match code {
            "available" => Some(Available),
            "reserved" => Some(Reserved),
            "rented" => Some(Rented),
            "maintenance" => Some(Maintenance),
            "disabled" => Some(Disabled),
            _ => None,
        }
    }

    /// Transitions this core performs. Admin moves to and from
    /// maintenance/disabled happen outside and are not listed.
    pub const fn can_transition_to(&self, next: CycleStatus) -> bool {
        use CycleStatus::*;
        matches!(
            (self, next),
            (Available, Reserved) | (Reserved, Rented) | (Reserved, Available) | (Rented, Available)
        )
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Rental status
// ============================================================================

/// ```text
/// (none) --commit--> active --sweep--> overdue --return--> returned
///                    active --return--> returned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    Active,
    Overdue,
    Returned,
}

impl RentalStatus {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            RentalStatus::Active => "active",
            RentalStatus::Overdue => "overdue",
            RentalStatus::Returned => "returned",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "active" => Some(RentalStatus::Active),
            "overdue" => Some(RentalStatus::Overdue),
            "returned" => Some(RentalStatus::Returned),
            _ => None,
        }
    }

    /// Open rentals count against the one-per-student / one-per-cycle rule
    #[inline]
    pub const fn is_open(&self) -> bool {
        matches!(self, RentalStatus::Active | RentalStatus::Overdue)
    }

    pub const fn can_transition_to(&self, next: RentalStatus) -> bool {
        use RentalStatus::*;
        matches!(
            (self, next),
            (Active, Overdue) | (Active, Returned) | (Overdue, Returned)
        )
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Token kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Rental,
    Return,
}

impl TokenKind {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            TokenKind::Rental => "rental",
            TokenKind::Return => "return",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "rental" => Some(TokenKind::Rental),
            "return" => Some(TokenKind::Return),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Token ID
// ============================================================================

/// Opaque, unguessable token identifier (URL-safe base64 of random bytes).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenId(String);

impl TokenId {
    /// Random bytes behind a token. 128 bits.
    pub const ENTROPY_BYTES: usize = 16;

    /// Generate a fresh random token ID
    pub fn generate() -> Self {
        Self(platform::crypto::random_token(Self::ENTROPY_BYTES))
    }

    /// Parse a token ID received from a client.
    ///
    /// Only accepts the exact shape [`TokenId::generate`] produces, so junk
    /// input is rejected before it reaches storage.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match platform::crypto::from_base64url(raw) {
            Ok(bytes) if bytes.len() == Self::ENTROPY_BYTES => Some(Self(raw.to_string())),
            _ => None,
        }
    }

    /// Rebuild from trusted storage without validation
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Token IDs are bearer credentials; keep them out of debug logs.
impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "TokenId({}…)", prefix)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "{}…", prefix)
    }
}

// ============================================================================
// Rental duration
// ============================================================================

/// Allocated rental time in whole minutes, validated against the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalDuration(u32);

impl RentalDuration {
    pub fn new(minutes: u32, max_minutes: u32) -> Option<Self> {
        if (1..=max_minutes).contains(&minutes) {
            Some(Self(minutes))
        } else {
            None
        }
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Role of the authenticated caller, as asserted by the upstream auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Guard,
    Admin,
}

impl Role {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Guard => "guard",
            Role::Admin => "admin",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "student" => Some(Role::Student),
            "guard" => Some(Role::Guard),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Guards hand out cycles; admins may act for them.
    #[inline]
    pub const fn can_issue_rentals(&self) -> bool {
        matches!(self, Role::Guard | Role::Admin)
    }

    /// Guards take cycles back; admins may act for them.
    #[inline]
    pub const fn can_accept_returns(&self) -> bool {
        matches!(self, Role::Guard | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// True when the caller is this student, or an admin acting for them
    pub fn acts_for_student(&self, student_id: UserId) -> bool {
        match self.role {
            Role::Student => self.id == student_id,
            Role::Admin => true,
            Role::Guard => false,
        }
    }
}
