//! In-Memory Repository Implementation
//!
//! Backs tests and local runs without PostgreSQL. All tables sit behind one
//! lock and every mutating method does its check-and-set under a single write
//! guard, which gives the same single-winner guarantees as the conditional
//! SQL in the PostgreSQL store.

use chrono::{DateTime, Utc};
use kernel::id::{CycleId, RentalId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::entities::{ClaimOutcome, Cycle, QrToken, Rental, Student};
use crate::domain::repository::{DirectoryRepository, RentalRepository, TokenRepository};
use crate::domain::value_objects::{CycleStatus, RentalStatus, TokenId};
use crate::error::{RentalError, RentalResult};

#[derive(Debug, Default)]
struct Tables {
    cycles: HashMap<CycleId, Cycle>,
    students: HashMap<UserId, Student>,
    rentals: HashMap<RentalId, Rental>,
    tokens: HashMap<TokenId, QrToken>,
}

impl Tables {
    fn open_rental_for_student(&self, student_id: UserId) -> Option<&Rental> {
        self.rentals
            .values()
            .find(|r| r.student_id == student_id && r.is_open())
    }

    fn open_rental_for_cycle(&self, cycle_id: CycleId) -> Option<&Rental> {
        self.rentals
            .values()
            .find(|r| r.cycle_id == cycle_id && r.is_open())
    }
}

/// In-memory store implementing every rental repository trait
#[derive(Debug, Clone, Default)]
pub struct InMemoryRentalStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRentalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision or overwrite a cycle
    pub async fn insert_cycle(&self, cycle: Cycle) {
        self.tables.write().await.cycles.insert(cycle.id, cycle);
    }

    /// Provision or overwrite a student
    pub async fn insert_student(&self, student: Student) {
        self.tables
            .write()
            .await
            .students
            .insert(student.id, student);
    }

    pub async fn cycle(&self, cycle_id: CycleId) -> Option<Cycle> {
        self.tables.read().await.cycles.get(&cycle_id).cloned()
    }

    pub async fn student(&self, student_id: UserId) -> Option<Student> {
        self.tables.read().await.students.get(&student_id).cloned()
    }

    pub async fn rentals(&self) -> Vec<Rental> {
        self.tables.read().await.rentals.values().cloned().collect()
    }

    pub async fn token_count(&self) -> usize {
        self.tables.read().await.tokens.len()
    }
}

impl TokenRepository for InMemoryRentalStore {
    async fn create(&self, token: &QrToken) -> RentalResult<()> {
        let mut tables = self.tables.write().await;
        if tables.tokens.contains_key(&token.id) {
            return Err(RentalError::Internal("duplicate token id".to_string()));
        }
        tables.tokens.insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn find(&self, token_id: &TokenId) -> RentalResult<Option<QrToken>> {
        Ok(self.tables.read().await.tokens.get(token_id).cloned())
    }

    async fn claim(&self, token_id: &TokenId, now: DateTime<Utc>) -> RentalResult<ClaimOutcome> {
        let mut tables = self.tables.write().await;
        let Some(token) = tables.tokens.get_mut(token_id) else {
            return Ok(ClaimOutcome::NotFound);
        };

        if token.is_expired(now) || token.discarded_at.is_some() {
            if !token.is_claimed() && token.discarded_at.is_none() {
                token.discarded_at = Some(now);
            }
            return Ok(ClaimOutcome::Expired(token.clone()));
        }

        if token.is_claimed() {
            return Ok(ClaimOutcome::AlreadyClaimed(token.clone()));
        }

        token.claimed_at = Some(now);
        Ok(ClaimOutcome::Claimed(token.clone()))
    }

    async fn discard_expired(&self, now: DateTime<Utc>) -> RentalResult<Vec<QrToken>> {
        let mut tables = self.tables.write().await;
        let mut discarded = Vec::new();
        for token in tables.tokens.values_mut() {
            if !token.is_claimed() && token.discarded_at.is_none() && token.is_expired(now) {
                token.discarded_at = Some(now);
                discarded.push(token.clone());
            }
        }
        Ok(discarded)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> RentalResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, t| t.expires_at >= cutoff);
        Ok((before - tables.tokens.len()) as u64)
    }
}

impl DirectoryRepository for InMemoryRentalStore {
    async fn find_cycle(&self, cycle_id: CycleId) -> RentalResult<Option<Cycle>> {
        Ok(self.cycle(cycle_id).await)
    }

    async fn find_student(&self, student_id: UserId) -> RentalResult<Option<Student>> {
        Ok(self.student(student_id).await)
    }
}

impl RentalRepository for InMemoryRentalStore {
    async fn find_rental(&self, rental_id: RentalId) -> RentalResult<Option<Rental>> {
        Ok(self.tables.read().await.rentals.get(&rental_id).cloned())
    }

    async fn find_open_rental_for_student(
        &self,
        student_id: UserId,
    ) -> RentalResult<Option<Rental>> {
        Ok(self
            .tables
            .read()
            .await
            .open_rental_for_student(student_id)
            .cloned())
    }

    async fn find_past_due(&self, now: DateTime<Utc>) -> RentalResult<Vec<Rental>> {
        Ok(self
            .tables
            .read()
            .await
            .rentals
            .values()
            .filter(|r| r.is_past_due(now))
            .cloned()
            .collect())
    }

    async fn reserve_cycle(&self, cycle_id: CycleId, token_id: &TokenId) -> RentalResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.cycles.get_mut(&cycle_id) {
            Some(cycle) if cycle.is_reservable() => {
                cycle.status = CycleStatus::Reserved;
                cycle.pending_token = Some(token_id.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_cycle(&self, cycle_id: CycleId, token_id: &TokenId) -> RentalResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.cycles.get_mut(&cycle_id) {
            Some(cycle) if cycle.is_reserved_by(token_id) => {
                cycle.status = CycleStatus::Available;
                cycle.pending_token = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_stale_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RentalResult<Vec<CycleId>> {
        let mut tables = self.tables.write().await;
        let Tables { cycles, tokens, .. } = &mut *tables;

        let mut released = Vec::new();
        for cycle in cycles.values_mut() {
            if cycle.status != CycleStatus::Reserved {
                continue;
            }
            let live = cycle
                .pending_token
                .as_ref()
                .and_then(|id| tokens.get(id))
                .is_some_and(|t| !t.is_expired(cutoff));
            if !live {
                cycle.status = CycleStatus::Available;
                cycle.pending_token = None;
                released.push(cycle.id);
            }
        }
        Ok(released)
    }

    async fn commit_rental(&self, rental: &Rental, token_id: &TokenId) -> RentalResult<()> {
        let mut tables = self.tables.write().await;

        let reserved = tables
            .cycles
            .get(&rental.cycle_id)
            .is_some_and(|c| c.is_reserved_by(token_id));
        if !reserved {
            return Err(RentalError::CycleNotReserved);
        }
        if tables.open_rental_for_student(rental.student_id).is_some() {
            return Err(RentalError::StudentHasOpenRental);
        }
        if tables.open_rental_for_cycle(rental.cycle_id).is_some() {
            return Err(RentalError::CycleHasOpenRental);
        }

        if let Some(cycle) = tables.cycles.get_mut(&rental.cycle_id) {
            cycle.status = CycleStatus::Rented;
            cycle.pending_token = None;
        }
        tables.rentals.insert(rental.id, rental.clone());
        Ok(())
    }

    async fn mark_overdue(&self, rental_id: RentalId) -> RentalResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.rentals.get_mut(&rental_id) {
            Some(rental) if rental.status == RentalStatus::Active => {
                rental.status = RentalStatus::Overdue;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_return(
        &self,
        rental_id: RentalId,
        fine: i64,
        returned_at: DateTime<Utc>,
        location: &str,
    ) -> RentalResult<Rental> {
        let mut tables = self.tables.write().await;

        let rental = tables
            .rentals
            .get_mut(&rental_id)
            .ok_or(RentalError::RentalNotFound)?;
        if !rental.is_open() {
            return Err(RentalError::RentalAlreadyReturned);
        }
        rental.status = RentalStatus::Returned;
        rental.actual_return_time = Some(returned_at);
        rental.fine = fine;
        let returned = rental.clone();

        match tables.cycles.get_mut(&returned.cycle_id) {
            Some(cycle) if cycle.status == CycleStatus::Rented => {
                cycle.status = CycleStatus::Available;
                cycle.current_location = location.to_string();
            }
            _ => {
                tracing::warn!(cycle_id = %returned.cycle_id, "Returned cycle was not in rented state");
            }
        }

        if let Some(student) = tables.students.get_mut(&returned.student_id) {
            student.outstanding_fine += fine;
        }

        Ok(returned)
    }
}
