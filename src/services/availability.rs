//! Admission control for exclusive clinic slots and capacity-capped hotel stays.
//!
//! Every admission runs its check and its insert as one unit:
//! - an in-process async lock keyed by (doctor, slot) or by venue serialises
//!   concurrent callers for the same resource;
//! - the store enforces the same invariant on its own (partial unique index
//!   for slots, insert-then-count inside one write transaction for stays), so
//!   a second process writing to the same database cannot over-book either.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::db::{
    HospitalReservation, HospitalReservationRepository, HotelReservation,
    HotelReservationRepository, NewHospitalReservation, NewHotelReservation,
};
use crate::error::AppResult;

/// Why an admission was refused. These are expected outcomes, not failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionConflict {
    #[error("Doctor {doctor_id} is already booked at {appointment_at}")]
    SlotConflict {
        doctor_id: String,
        appointment_at: NaiveDateTime,
    },

    #[error("Venue {venue_id} is fully booked for {check_in}..{check_out} (capacity {capacity})")]
    CapacityExceeded {
        venue_id: String,
        check_in: NaiveDate,
        check_out: NaiveDate,
        capacity: i64,
    },
}

impl AdmissionConflict {
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionConflict::SlotConflict { .. } => "SLOT_CONFLICT",
            AdmissionConflict::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
        }
    }
}

/// Outcome of an admission attempt: the committed row, or the conflict.
pub type Admission<T> = Result<T, AdmissionConflict>;

/// Async mutexes created on demand per key.
struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    const PRUNE_THRESHOLD: usize = 1024;

    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() >= Self::PRUNE_THRESHOLD {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub struct AvailabilityLedger {
    slot_locks: KeyedLocks<(String, NaiveDateTime)>,
    venue_locks: KeyedLocks<String>,
}

impl Default for AvailabilityLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityLedger {
    pub fn new() -> Self {
        Self {
            slot_locks: KeyedLocks::new(),
            venue_locks: KeyedLocks::new(),
        }
    }

    /// Admit and commit a clinic appointment if the doctor's slot is free.
    ///
    /// The slot is taken when a PENDING or CONFIRMED reservation exists for the
    /// same doctor and `appointment_at`.
    pub async fn try_admit_exclusive_slot(
        &self,
        pool: &SqlitePool,
        reservation: &NewHospitalReservation,
    ) -> AppResult<Admission<HospitalReservation>> {
        let _guard = self
            .slot_locks
            .lock((reservation.doctor_id.clone(), reservation.appointment_at))
            .await;

        match HospitalReservationRepository::insert(pool, reservation).await {
            Ok(row) => {
                tracing::info!(
                    "Admitted slot {} for doctor {} (reservation {})",
                    row.appointment_at,
                    row.doctor_id,
                    row.id
                );
                Ok(Ok(row))
            }
            Err(e) if e.is_unique_violation() => {
                tracing::info!(
                    "Slot {} for doctor {} already taken",
                    reservation.appointment_at,
                    reservation.doctor_id
                );
                Ok(Err(AdmissionConflict::SlotConflict {
                    doctor_id: reservation.doctor_id.clone(),
                    appointment_at: reservation.appointment_at,
                }))
            }
            Err(e) => Err(e),
        }
    }

    /// Admit and commit a hotel stay if fewer than `capacity` active stays overlap it.
    ///
    /// The new row is inserted first, which takes the store's write lock, and
    /// the overlap count (including the new row) is taken inside the same
    /// transaction; the transaction is rolled back when the count exceeds
    /// `capacity`.
    pub async fn try_admit_range_capacity(
        &self,
        pool: &SqlitePool,
        reservation: &NewHotelReservation,
        capacity: i64,
    ) -> AppResult<Admission<HotelReservation>> {
        let _guard = self.venue_locks.lock(reservation.venue_id.clone()).await;

        let mut tx = pool.begin().await?;
        let row = HotelReservationRepository::insert(&mut *tx, reservation).await?;
        let overlapping = HotelReservationRepository::count_overlapping_active(
            &mut *tx,
            &reservation.venue_id,
            reservation.check_in,
            reservation.check_out,
        )
        .await?;

        if overlapping > capacity {
            tx.rollback().await?;
            tracing::info!(
                "Venue {} at capacity for {}..{} ({} active, capacity {})",
                reservation.venue_id,
                reservation.check_in,
                reservation.check_out,
                overlapping - 1,
                capacity
            );
            return Ok(Err(AdmissionConflict::CapacityExceeded {
                venue_id: reservation.venue_id.clone(),
                check_in: reservation.check_in,
                check_out: reservation.check_out,
                capacity,
            }));
        }

        tx.commit().await?;
        tracing::info!(
            "Admitted stay {}..{} at venue {} (reservation {}, {}/{})",
            row.check_in,
            row.check_out,
            row.venue_id,
            row.id,
            overlapping,
            capacity
        );
        Ok(Ok(row))
    }
}
