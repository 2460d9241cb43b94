//! Domain Services
//!
//! Pure time arithmetic and fine computation. Nothing here reads a clock;
//! callers pass `now` in, which keeps every result reproducible for receipts
//! and audits.

use chrono::{DateTime, Duration, Utc};

const US_PER_MINUTE: i64 = 60_000_000;

/// Expiry instant for something issued at `issued_at` with the given TTL.
///
/// Saturates at the largest representable instant instead of overflowing.
pub fn expires_at(issued_at: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    i64::try_from(ttl.as_millis())
        .ok()
        .and_then(Duration::try_milliseconds)
        .and_then(|ttl| issued_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Expired strictly after the expiry instant; the instant itself is still valid.
#[inline]
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now > expires_at
}

/// Milliseconds left before expiry, never negative
pub fn remaining_ms(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_milliseconds().max(0)
}

/// Whole minutes from `from` to `to`, rounding any started minute up; 0 if `to <= from`.
///
/// Works at microsecond resolution, the precision PostgreSQL stores.
pub fn minutes_ceil(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let elapsed = to - from;
    let elapsed_us = elapsed
        .num_microseconds()
        .unwrap_or_else(|| elapsed.num_milliseconds().saturating_mul(1_000));
    if elapsed_us <= 0 {
        return 0;
    }
    elapsed_us / US_PER_MINUTE + i64::from(elapsed_us % US_PER_MINUTE != 0)
}

/// `start + duration_minutes`
pub fn expected_return_time(start: DateTime<Utc>, duration_minutes: u32) -> DateTime<Utc> {
    start + Duration::minutes(i64::from(duration_minutes))
}

/// Overtime in whole started minutes past the expected return time
#[inline]
pub fn overtime_minutes(expected: DateTime<Utc>, actual: DateTime<Utc>) -> i64 {
    minutes_ceil(expected, actual)
}

// ============================================================================
// Fine calculator
// ============================================================================

/// Late-return fine rule.
///
/// `fine = max(0, overtime_minutes - grace_period_minutes) * rate_per_minute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    pub grace_period_minutes: i64,
    pub rate_per_minute: i64,
}

/// Breakdown of a computed fine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FineAssessment {
    pub overdue_minutes: i64,
    pub fineable_minutes: i64,
    pub amount: i64,
}

impl FinePolicy {
    pub const DEFAULT: FinePolicy = FinePolicy {
        grace_period_minutes: 15,
        rate_per_minute: 5,
    };

    pub fn new(grace_period_minutes: i64, rate_per_minute: i64) -> Self {
        Self {
            grace_period_minutes: grace_period_minutes.max(0),
            rate_per_minute: rate_per_minute.max(0),
        }
    }

    pub fn assess(&self, expected: DateTime<Utc>, actual: DateTime<Utc>) -> FineAssessment {
        let overdue_minutes = overtime_minutes(expected, actual);
        let fineable_minutes = (overdue_minutes - self.grace_period_minutes).max(0);
        FineAssessment {
            overdue_minutes,
            fineable_minutes,
            amount: fineable_minutes.saturating_mul(self.rate_per_minute),
        }
    }
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_expiry_boundary() {
        let issued = t0();
        let expiry = expires_at(issued, std::time::Duration::from_secs(30));
        assert_eq!(expiry, issued + Duration::seconds(30));

        assert!(!is_expired(expiry, expiry));
        assert!(is_expired(expiry, expiry + Duration::milliseconds(1)));
        assert_eq!(remaining_ms(expiry, issued), 30_000);
        assert_eq!(remaining_ms(expiry, expiry + Duration::seconds(5)), 0);
    }

    #[test]
    fn test_minutes_ceil() {
        let start = t0();
        assert_eq!(minutes_ceil(start, start), 0);
        assert_eq!(minutes_ceil(start, start - Duration::minutes(3)), 0);
        assert_eq!(minutes_ceil(start, start + Duration::milliseconds(1)), 1);
        assert_eq!(minutes_ceil(start, start + Duration::seconds(60)), 1);
        assert_eq!(minutes_ceil(start, start + Duration::seconds(61)), 2);
        assert_eq!(minutes_ceil(start, start + Duration::microseconds(1)), 1);
        assert_eq!(
            minutes_ceil(start, start + Duration::minutes(15) + Duration::microseconds(500)),
            16
        );
    }

    #[test]
    fn test_sub_millisecond_overtime_is_fined() {
        let expected = t0();
        let actual = expected + Duration::minutes(15) + Duration::microseconds(500);
        let assessment = FinePolicy::DEFAULT.assess(expected, actual);

        assert_eq!(assessment.overdue_minutes, 16);
        assert_eq!(assessment.fineable_minutes, 1);
        assert_eq!(assessment.amount, 5);
    }

    #[test]
    fn test_expires_at_saturates() {
        let expiry = expires_at(t0(), std::time::Duration::from_secs(u64::MAX));
        assert_eq!(expiry, DateTime::<Utc>::MAX_UTC);

        let expiry = expires_at(t0(), std::time::Duration::from_secs(i64::MAX as u64 / 1_000));
        assert_eq!(expiry, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_fine_within_grace_is_zero() {
        let expected = t0();
        let policy = FinePolicy::DEFAULT;
        for minutes in 0..=15 {
            let fine = policy.assess(expected, expected + Duration::minutes(minutes));
            assert_eq!(fine.amount, 0, "{} minutes late should be free", minutes);
        }
        // Early returns are never fined
        assert_eq!(
            policy.assess(expected, expected - Duration::hours(1)),
            FineAssessment::default()
        );
    }

    #[test]
    fn test_fine_after_grace() {
        let expected = t0();
        let fine = FinePolicy::DEFAULT.assess(expected, expected + Duration::minutes(20));
        assert_eq!(
            fine,
            FineAssessment {
                overdue_minutes: 20,
                fineable_minutes: 5,
                amount: 25,
            }
        );

        // One second into minute 16 already counts
        let fine = FinePolicy::DEFAULT.assess(expected, expected + Duration::seconds(15 * 60 + 1));
        assert_eq!(fine.amount, 5);
    }

    #[test]
    fn test_fine_is_monotonic() {
        let expected = t0();
        let policy = FinePolicy::DEFAULT;
        let mut previous = 0;
        for seconds in (0..4 * 3600).step_by(17) {
            let amount = policy.assess(expected, expected + Duration::seconds(seconds)).amount;
            assert!(amount >= previous);
            previous = amount;
        }
    }

    #[test]
    fn test_fine_is_deterministic() {
        let expected = t0();
        let actual = expected + Duration::minutes(95);
        let policy = FinePolicy::new(0, 1);
        assert_eq!(policy.assess(expected, actual), policy.assess(expected, actual));
        assert_eq!(policy.assess(expected, actual).amount, 95);
    }

    #[test]
    fn test_policy_clamps_negative_inputs() {
        let policy = FinePolicy::new(-5, -1);
        assert_eq!(policy.grace_period_minutes, 0);
        assert_eq!(policy.rate_per_minute, 0);
    }
}
