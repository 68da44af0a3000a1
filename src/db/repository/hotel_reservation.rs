use chrono::{NaiveDate, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::{HotelReservation, NewHotelReservation, ReservationStatus};
use crate::error::{AppError, AppResult};

// ============================================================================
// Hotel Reservation Repository
// ============================================================================

pub struct HotelReservationRepository;

impl HotelReservationRepository {
    /// Insert a PENDING stay.
    pub async fn insert<'e, E>(
        executor: E,
        reservation: &NewHotelReservation,
    ) -> AppResult<HotelReservation>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, HotelReservation>(
            r#"
            INSERT INTO hotel_reservations (
                id, venue_id, member_id, check_in, check_out, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, venue_id, member_id, check_in, check_out, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&reservation.venue_id)
        .bind(&reservation.member_id)
        .bind(reservation.check_in)
        .bind(reservation.check_out)
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

    /// Count active (PENDING/CONFIRMED) stays at `venue_id` overlapping the range.
    ///
    /// Overlap: `existing.check_in <= check_out AND existing.check_out >= check_in`.
    pub async fn count_overlapping_active<'e, E>(
        executor: E,
        venue_id: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> AppResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM hotel_reservations
            WHERE venue_id = ?
              AND status IN ('PENDING', 'CONFIRMED')
              AND check_in <= ?
              AND check_out >= ?
            "#,
        )
        .bind(venue_id)
        .bind(check_out)
        .bind(check_in)
        .fetch_one(executor)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<HotelReservation>> {
        sqlx::query_as::<_, HotelReservation>(
            r#"
            SELECT
                id, venue_id, member_id, check_in, check_out, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            FROM hotel_reservations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Stays of a member, latest check-in first.
    pub async fn find_by_member(
        pool: &SqlitePool,
        member_id: &str,
    ) -> AppResult<Vec<HotelReservation>> {
        sqlx::query_as::<_, HotelReservation>(
            r#"
            SELECT
                id, venue_id, member_id, check_in, check_out, status,
                reserver_name, reserver_phone, pet_name, memo, created_at, updated_at
            FROM hotel_reservations
            WHERE member_id = ?
            ORDER BY check_in DESC
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
    ) -> AppResult<Option<HotelReservation>> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, HotelReservation>(
            r#"
            UPDATE hotel_reservations
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING
                id, venue_id, member_id, check_in, check_out, status,
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
            "SELECT COUNT(*) FROM hotel_reservations WHERE member_id = ? AND status = ?",
        )
        .bind(member_id)
        .bind(status.as_str())
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}
