//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use kernel::id::{CycleId, RentalId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{
    ClaimOutcome, Cycle, QrToken, Rental, RentalDraft, Student, TokenPayload,
};
use crate::domain::repository::{DirectoryRepository, RentalRepository, TokenRepository};
use crate::domain::value_objects::{CycleStatus, RentalStatus, TokenId, TokenKind};
use crate::error::{RentalError, RentalResult};

const ONE_OPEN_PER_STUDENT: &str = "rentals_one_open_per_student";
const ONE_OPEN_PER_CYCLE: &str = "rentals_one_open_per_cycle";

const TOKEN_COLUMNS: &str = r#"
    token_id,
    token_kind,
    cycle_id,
    student_id,
    guard_id,
    duration_minutes,
    location,
    rental_id,
    issued_at,
    expires_at,
    claimed_at,
    discarded_at
"#;

const RENTAL_COLUMNS: &str = r#"
    rental_id,
    student_id,
    cycle_id,
    guard_id,
    location,
    duration_minutes,
    start_time,
    expected_return_time,
    actual_return_time,
    rental_status,
    fine
"#;

/// PostgreSQL-backed rental repository
#[derive(Clone)]
pub struct PgRentalRepository {
    pool: PgPool,
}

impl PgRentalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_token(&self, token_id: &TokenId) -> RentalResult<Option<QrToken>> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM rental_tokens WHERE token_id = $1"
        ))
        .bind(token_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_token()).transpose()
    }
}

/// Map unique-index violations on `rentals` to the invariant they protect
fn map_open_rental_violation(err: sqlx::Error) -> RentalError {
    if let sqlx::Error::Database(db) = &err {
        match db.constraint() {
            Some(ONE_OPEN_PER_STUDENT) => return RentalError::StudentHasOpenRental,
            Some(ONE_OPEN_PER_CYCLE) => return RentalError::CycleHasOpenRental,
            _ => {}
        }
    }
    RentalError::Database(err)
}

// ============================================================================
// Token Repository Implementation
// ============================================================================

impl TokenRepository for PgRentalRepository {
    async fn create(&self, token: &QrToken) -> RentalResult<()> {
        let (cycle_id, student_id, guard_id, duration, location, rental_id) = match &token.payload
        {
            TokenPayload::Rental(draft) => (
                Some(draft.cycle_id.into_uuid()),
                Some(draft.student_id.into_uuid()),
                Some(draft.guard_id.into_uuid()),
                Some(draft.duration_minutes as i32),
                Some(draft.location.as_str()),
                None,
            ),
            TokenPayload::Return { rental_id } => {
                (None, None, None, None, None, Some(rental_id.into_uuid()))
            }
        };

        sqlx::query(
            r#"
            INSERT INTO rental_tokens (
                token_id,
                token_kind,
                cycle_id,
                student_id,
                guard_id,
                duration_minutes,
                location,
                rental_id,
                issued_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(token.id.as_str())
        .bind(token.kind().code())
        .bind(cycle_id)
        .bind(student_id)
        .bind(guard_id)
        .bind(duration)
        .bind(location)
        .bind(rental_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(token = %token.id, kind = %token.kind(), "Token stored");
        Ok(())
    }

    async fn find(&self, token_id: &TokenId) -> RentalResult<Option<QrToken>> {
        self.fetch_token(token_id).await
    }

    async fn claim(&self, token_id: &TokenId, now: DateTime<Utc>) -> RentalResult<ClaimOutcome> {
        // The only linearization point for redemption
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            r#"
            UPDATE rental_tokens
            SET claimed_at = $2
            WHERE token_id = $1
              AND claimed_at IS NULL
              AND discarded_at IS NULL
              AND expires_at >= $2
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(token_id.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(ClaimOutcome::Claimed(row.into_token()?));
        }

        // Lost the guard; find out why
        let Some(token) = self.fetch_token(token_id).await? else {
            return Ok(ClaimOutcome::NotFound);
        };

        if token.is_expired(now) || token.discarded_at.is_some() {
            if token.is_claimed() || token.discarded_at.is_some() {
                return Ok(ClaimOutcome::Expired(token));
            }
            let row = sqlx::query_as::<_, TokenRow>(&format!(
                r#"
                UPDATE rental_tokens
                SET discarded_at = COALESCE(discarded_at, $2)
                WHERE token_id = $1 AND claimed_at IS NULL
                RETURNING {TOKEN_COLUMNS}
                "#
            ))
            .bind(token_id.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            return match row {
                Some(row) => Ok(ClaimOutcome::Expired(row.into_token()?)),
                None => Ok(ClaimOutcome::Expired(token)),
            };
        }

        tracing::warn!(token = %token_id, "Token claim lost");
        Ok(ClaimOutcome::AlreadyClaimed(token))
    }

    async fn discard_expired(&self, now: DateTime<Utc>) -> RentalResult<Vec<QrToken>> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            r#"
            UPDATE rental_tokens
            SET discarded_at = $1
            WHERE claimed_at IS NULL
              AND discarded_at IS NULL
              AND expires_at < $1
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TokenRow::into_token).collect()
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> RentalResult<u64> {
        let deleted = sqlx::query("DELETE FROM rental_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}

// ============================================================================
// Directory Repository Implementation
// ============================================================================

impl DirectoryRepository for PgRentalRepository {
    async fn find_cycle(&self, cycle_id: CycleId) -> RentalResult<Option<Cycle>> {
        let row = sqlx::query_as::<_, CycleRow>(
            r#"
            SELECT
                cycle_id,
                cycle_status,
                current_location,
                battery_level,
                pending_token_id
            FROM cycles
            WHERE cycle_id = $1
            "#,
        )
        .bind(cycle_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_cycle()).transpose()
    }

    async fn find_student(&self, student_id: UserId) -> RentalResult<Option<Student>> {
        let row = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT student_id, outstanding_fine FROM students WHERE student_id = $1",
        )
        .bind(student_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, fine)| Student::new(id.into(), fine)))
    }
}

// ============================================================================
// Rental Repository Implementation
// ============================================================================

impl RentalRepository for PgRentalRepository {
    async fn find_rental(&self, rental_id: RentalId) -> RentalResult<Option<Rental>> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE rental_id = $1"
        ))
        .bind(rental_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_rental()).transpose()
    }

    async fn find_open_rental_for_student(
        &self,
        student_id: UserId,
    ) -> RentalResult<Option<Rental>> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            r#"
            SELECT {RENTAL_COLUMNS} FROM rentals
            WHERE student_id = $1 AND rental_status IN ('active', 'overdue')
            "#
        ))
        .bind(student_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_rental()).transpose()
    }

    async fn find_past_due(&self, now: DateTime<Utc>) -> RentalResult<Vec<Rental>> {
        let rows = sqlx::query_as::<_, RentalRow>(&format!(
            r#"
            SELECT {RENTAL_COLUMNS} FROM rentals
            WHERE rental_status = 'active' AND expected_return_time < $1
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RentalRow::into_rental).collect()
    }

    async fn reserve_cycle(&self, cycle_id: CycleId, token_id: &TokenId) -> RentalResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cycles
            SET cycle_status = 'reserved', pending_token_id = $2, updated_at = now()
            WHERE cycle_id = $1
              AND cycle_status = 'available'
              AND pending_token_id IS NULL
            "#,
        )
        .bind(cycle_id.into_uuid())
        .bind(token_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_cycle(&self, cycle_id: CycleId, token_id: &TokenId) -> RentalResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cycles
            SET cycle_status = 'available', pending_token_id = NULL, updated_at = now()
            WHERE cycle_id = $1
              AND cycle_status = 'reserved'
              AND pending_token_id = $2
            "#,
        )
        .bind(cycle_id.into_uuid())
        .bind(token_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_stale_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RentalResult<Vec<CycleId>> {
        let released = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE cycles c
            SET cycle_status = 'available', pending_token_id = NULL, updated_at = now()
            WHERE c.cycle_status = 'reserved'
              AND NOT EXISTS (
                  SELECT 1 FROM rental_tokens t
                  WHERE t.token_id = c.pending_token_id
                    AND t.expires_at >= $1
              )
            RETURNING c.cycle_id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(released.into_iter().map(CycleId::from_uuid).collect())
    }

    async fn commit_rental(&self, rental: &Rental, token_id: &TokenId) -> RentalResult<()> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"
            UPDATE cycles
            SET cycle_status = 'rented', pending_token_id = NULL, updated_at = now()
            WHERE cycle_id = $1
              AND cycle_status = 'reserved'
              AND pending_token_id = $2
            "#,
        )
        .bind(rental.cycle_id.into_uuid())
        .bind(token_id.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if moved != 1 {
            tracing::warn!(cycle_id = %rental.cycle_id, "Cycle no longer reserved at commit");
            return Err(RentalError::CycleNotReserved);
        }

        sqlx::query(
            r#"
            INSERT INTO rentals (
                rental_id,
                student_id,
                cycle_id,
                guard_id,
                location,
                duration_minutes,
                start_time,
                expected_return_time,
                rental_status,
                fine
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(rental.id.into_uuid())
        .bind(rental.student_id.into_uuid())
        .bind(rental.cycle_id.into_uuid())
        .bind(rental.guard_id.into_uuid())
        .bind(&rental.location)
        .bind(rental.duration_minutes as i32)
        .bind(rental.start_time)
        .bind(rental.expected_return_time)
        .bind(rental.status.code())
        .bind(rental.fine)
        .execute(&mut *tx)
        .await
        .map_err(map_open_rental_violation)?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_overdue(&self, rental_id: RentalId) -> RentalResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rentals
            SET rental_status = 'overdue', updated_at = now()
            WHERE rental_id = $1 AND rental_status = 'active'
            "#,
        )
        .bind(rental_id.into_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_return(
        &self,
        rental_id: RentalId,
        fine: i64,
        returned_at: DateTime<Utc>,
        location: &str,
    ) -> RentalResult<Rental> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RentalRow>(&format!(
            r#"
            UPDATE rentals
            SET rental_status = 'returned',
                actual_return_time = $2,
                fine = $3,
                updated_at = now()
            WHERE rental_id = $1 AND rental_status IN ('active', 'overdue')
            RETURNING {RENTAL_COLUMNS}
            "#
        ))
        .bind(rental_id.into_uuid())
        .bind(returned_at)
        .bind(fine)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM rentals WHERE rental_id = $1)",
            )
            .bind(rental_id.into_uuid())
            .fetch_one(&mut *tx)
            .await?;

            return Err(if exists {
                RentalError::RentalAlreadyReturned
            } else {
                RentalError::RentalNotFound
            });
        };
        let returned = row.into_rental()?;

        let freed = sqlx::query(
            r#"
            UPDATE cycles
            SET cycle_status = 'available', current_location = $2, updated_at = now()
            WHERE cycle_id = $1 AND cycle_status = 'rented'
            "#,
        )
        .bind(returned.cycle_id.into_uuid())
        .bind(location)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if freed != 1 {
            tracing::warn!(cycle_id = %returned.cycle_id, "Returned cycle was not in rented state");
        }

        if fine > 0 {
            sqlx::query(
                r#"
                UPDATE students
                SET outstanding_fine = outstanding_fine + $2, updated_at = now()
                WHERE student_id = $1
                "#,
            )
            .bind(returned.student_id.into_uuid())
            .bind(fine)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(returned)
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct TokenRow {
    token_id: String,
    token_kind: String,
    cycle_id: Option<Uuid>,
    student_id: Option<Uuid>,
    guard_id: Option<Uuid>,
    duration_minutes: Option<i32>,
    location: Option<String>,
    rental_id: Option<Uuid>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    discarded_at: Option<DateTime<Utc>>,
}

impl TokenRow {
    fn into_token(self) -> RentalResult<QrToken> {
        let corrupt = || RentalError::Internal(format!("corrupt token row ({})", self.token_kind));

        let payload = match TokenKind::from_code(&self.token_kind) {
            Some(TokenKind::Rental) => {
                let (Some(cycle_id), Some(student_id), Some(guard_id), Some(duration), Some(location)) = (
                    self.cycle_id,
                    self.student_id,
                    self.guard_id,
                    self.duration_minutes,
                    self.location.clone(),
                ) else {
                    return Err(corrupt());
                };
                TokenPayload::Rental(RentalDraft {
                    cycle_id: cycle_id.into(),
                    student_id: student_id.into(),
                    guard_id: guard_id.into(),
                    duration_minutes: u32::try_from(duration).map_err(|_| corrupt())?,
                    location,
                })
            }
            Some(TokenKind::Return) => TokenPayload::Return {
                rental_id: self.rental_id.ok_or_else(corrupt)?.into(),
            },
            None => return Err(corrupt()),
        };

        Ok(QrToken {
            id: TokenId::from_stored(self.token_id),
            payload,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            claimed_at: self.claimed_at,
            discarded_at: self.discarded_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CycleRow {
    cycle_id: Uuid,
    cycle_status: String,
    current_location: String,
    battery_level: Option<i16>,
    pending_token_id: Option<String>,
}

impl CycleRow {
    fn into_cycle(self) -> RentalResult<Cycle> {
        let status = CycleStatus::from_code(&self.cycle_status).ok_or_else(|| {
            RentalError::Internal(format!("unknown cycle status: {}", self.cycle_status))
        })?;

        Ok(Cycle {
            id: self.cycle_id.into(),
            status,
            current_location: self.current_location,
            battery_level: self.battery_level.and_then(|b| u8::try_from(b).ok()),
            pending_token: self.pending_token_id.map(TokenId::from_stored),
        })
    }
}

#[derive(sqlx::FromRow)]
struct RentalRow {
    rental_id: Uuid,
    student_id: Uuid,
    cycle_id: Uuid,
    guard_id: Uuid,
    location: String,
    duration_minutes: i32,
    start_time: DateTime<Utc>,
    expected_return_time: DateTime<Utc>,
    actual_return_time: Option<DateTime<Utc>>,
    rental_status: String,
    fine: i64,
}

impl RentalRow {
    fn into_rental(self) -> RentalResult<Rental> {
        let status = RentalStatus::from_code(&self.rental_status).ok_or_else(|| {
            RentalError::Internal(format!("unknown rental status: {}", self.rental_status))
        })?;
        let duration_minutes = u32::try_from(self.duration_minutes).map_err(|_| {
            RentalError::Internal(format!("negative duration on rental {}", self.rental_id))
        })?;

        Ok(Rental {
            id: self.rental_id.into(),
            student_id: self.student_id.into(),
            cycle_id: self.cycle_id.into(),
            guard_id: self.guard_id.into(),
            location: self.location,
            duration_minutes,
            start_time: self.start_time,
            expected_return_time: self.expected_return_time,
            actual_return_time: self.actual_return_time,
            status,
            fine: self.fine,
        })
    }
}
