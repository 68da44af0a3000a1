use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{reminder_dedupe_key, CreateReminder, ReminderStatus, ReservationReminder};
use crate::error::{AppError, AppResult};

/// Repository for persisted reservation reminders.
///
/// Implementation notes:
/// - Scheduling is idempotent through the unique `dedupe_key`:
///   `INSERT ... ON CONFLICT(dedupe_key) DO NOTHING`.
/// - Leasing uses an atomic single-statement UPDATE with a subselect:
///   `UPDATE ... WHERE id = (SELECT id FROM ... LIMIT 1) RETURNING ...`
///   so two sweepers can never hold the lease of the same reminder.
/// - Terminal outcomes are recorded only by the current lease holder.
pub struct ReminderRepository;

impl ReminderRepository {
    /// Schedule a reminder. Returns `None` when a reminder with the same
    /// dedupe key already exists.
    pub async fn create_if_absent(
        pool: &SqlitePool,
        reminder: CreateReminder,
    ) -> AppResult<Option<ReservationReminder>> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let dedupe_key = reminder_dedupe_key(&reminder.reservation_id, reminder.kind);

        let row = sqlx::query_as::<_, ReservationReminder>(
            r#"
            INSERT INTO reservation_reminders (
                id,
                reservation_id,
                member_id,
                kind,
                status,
                fire_at,
                dedupe_key,
                lease_owner,
                lease_expires_at,
                last_error,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL, ?, ?)
            ON CONFLICT(dedupe_key) DO NOTHING
            RETURNING
                id,
                reservation_id,
                member_id,
                kind,
                status,
                fire_at,
                dedupe_key,
                lease_owner,
                lease_expires_at,
                last_error,
                created_at,
                updated_at
            "#,
        )
        .bind(id)
        .bind(reminder.reservation_id)
        .bind(reminder.member_id)
        .bind(reminder.kind.as_str())
        .bind(ReminderStatus::Pending.as_str())
        .bind(reminder.fire_at)
        .bind(dedupe_key)
        .bind(now)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Lease the earliest due reminder that nobody else holds.
    ///
    /// A reminder is due when it is PENDING and `fire_at <= now`; it is free
    /// when it has no lease or its lease expired. The outer WHERE repeats the
    /// freeness check so the UPDATE behaves as a compare-and-swap.
    pub async fn lease_next_due(
        pool: &SqlitePool,
        owner: &str,
        now: NaiveDateTime,
        lease_until: NaiveDateTime,
    ) -> AppResult<Option<ReservationReminder>> {
        let row = sqlx::query_as::<_, ReservationReminder>(
            r#"
            UPDATE reservation_reminders
            SET lease_owner = ?, lease_expires_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM reservation_reminders
                WHERE status = 'PENDING'
                  AND fire_at <= ?
                  AND (lease_owner IS NULL OR lease_expires_at <= ?)
                ORDER BY fire_at ASC
                LIMIT 1
            )
              AND status = 'PENDING'
              AND (lease_owner IS NULL OR lease_expires_at <= ?)
            RETURNING
                id,
                reservation_id,
                member_id,
                kind,
                status,
                fire_at,
                dedupe_key,
                lease_owner,
                lease_expires_at,
                last_error,
                created_at,
                updated_at
            "#,
        )
        .bind(owner)
        .bind(lease_until)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Record the terminal outcome of a leased reminder and release the lease.
    ///
    /// Returns `false` when `owner` no longer holds the lease.
    pub async fn complete_lease(
        pool: &SqlitePool,
        id: &str,
        owner: &str,
        status: ReminderStatus,
        last_error: Option<String>,
    ) -> AppResult<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE reservation_reminders
            SET status = ?,
                last_error = ?,
                lease_owner = NULL,
                lease_expires_at = NULL,
                updated_at = ?
            WHERE id = ? AND lease_owner = ? AND status = 'PENDING'
            "#,
        )
        .bind(status.as_str())
        .bind(last_error)
        .bind(now)
        .bind(id)
        .bind(owner)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Flip every PENDING, currently unleased reminder of a reservation to CANCELLED.
    ///
    /// Reminders under a live lease are being dispatched and are left alone.
    pub async fn cancel_pending_for_reservation(
        pool: &SqlitePool,
        reservation_id: &str,
        now: NaiveDateTime,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reservation_reminders
            SET status = 'CANCELLED', updated_at = ?
            WHERE reservation_id = ?
              AND status = 'PENDING'
              AND (lease_owner IS NULL OR lease_expires_at <= ?)
            "#,
        )
        .bind(now)
        .bind(reservation_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// All reminders of a reservation, earliest first.
    pub async fn find_by_reservation(
        pool: &SqlitePool,
        reservation_id: &str,
    ) -> AppResult<Vec<ReservationReminder>> {
        sqlx::query_as::<_, ReservationReminder>(
            r#"
            SELECT
                id,
                reservation_id,
                member_id,
                kind,
                status,
                fire_at,
                dedupe_key,
                lease_owner,
                lease_expires_at,
                last_error,
                created_at,
                updated_at
            FROM reservation_reminders
            WHERE reservation_id = ?
            ORDER BY fire_at ASC
            "#,
        )
        .bind(reservation_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
