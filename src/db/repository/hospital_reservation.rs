use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::{HospitalReservation, NewHospitalReservation, ReservationStatus};
use crate::error::{AppError, AppResult};

// ============================================================================
// Hospital Reservation Repository
// ============================================================================

pub struct HospitalReservationRepository;

impl HospitalReservationRepository {
    /// Insert a PENDING reservation.
    ///
    /// The partial unique index on `(doctor_id, appointment_at)` over active
    /// rows rejects a second active booking of the same slot; callers detect it
    /// with [`AppError::is_unique_violation`].
    pub async fn insert<'e, E>(
        executor: E,
        reservation: &NewHospitalReservation,
    ) -> AppResult<HospitalReservation>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, HospitalReservation>(
            r#"
            INSERT INTO hospital_reservations (
                id, venue_id, doctor_id, member_id, appointment_at, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, venue_id, doctor_id, member_id, appointment_at, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&reservation.venue_id)
        .bind(&reservation.doctor_id)
        .bind(&reservation.member_id)
        .bind(reservation.appointment_at)
        .bind(ReservationStatus::Pending.as_str())
        .bind(&reservation.reserver.reserver_name)
        .bind(&reservation.reserver.reserver_phone)
        .bind(&reservation.reserver.pet_name)
        .bind(&reservation.reserver.memo)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<HospitalReservation>> {
        sqlx::query_as::<_, HospitalReservation>(
            r#"
            SELECT
                id, venue_id, doctor_id, member_id, appointment_at, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            FROM hospital_reservations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Reservations of a member, most recent appointment first.
    pub async fn find_by_member(
        pool: &SqlitePool,
        member_id: &str,
    ) -> AppResult<Vec<HospitalReservation>> {
        sqlx::query_as::<_, HospitalReservation>(
            r#"
            SELECT
                id, venue_id, doctor_id, member_id, appointment_at, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            FROM hospital_reservations
            WHERE member_id = ?
            ORDER BY appointment_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Compare-and-set the status. Returns `None` when the row no longer has status `from`.
    pub async fn update_status(
        pool: &SqlitePool,
        id: &str,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> AppResult<Option<HospitalReservation>> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, HospitalReservation>(
            r#"
            UPDATE hospital_reservations
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING
                id, venue_id, doctor_id, member_id, appointment_at, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            "#,
        )
        .bind(to.as_str())
        .bind(now)
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn count_by_member_and_status(
        pool: &SqlitePool,
        member_id: &str,
        status: ReservationStatus,
    ) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM hospital_reservations WHERE member_id = ? AND status = ?",
        )
        .bind(member_id)
        .bind(status.as_str())
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}
