use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Repository
// ============================================================================

pub struct NotificationRepository;

impl NotificationRepository {
    /// Insert a notification. `event_id` is assigned by the store and only grows.
    pub async fn create(pool: &SqlitePool, notification: CreateNotification) -> AppResult<Notification> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let (target_type, target_id) = match notification.target {
            Some(target) => (Some(target.target_type), Some(target.target_id)),
            None => (None, None),
        };

        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (
                id, receiver_id, actor_id, notification_type, target_type, target_id,
                title, message, link, is_read, read_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?)
            RETURNING
                event_id, id, receiver_id, actor_id, notification_type, target_type, target_id,
                title, message, link, is_read, read_at, created_at
            "#,
        )
        .bind(id)
        .bind(notification.receiver_id)
        .bind(notification.actor_id)
        .bind(notification.notification_type.as_str())
        .bind(target_type)
        .bind(target_id)
        .bind(notification.title)
        .bind(notification.message)
        .bind(notification.link)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Page of a member's notifications, newest first.
    pub async fn find_by_receiver(
        pool: &SqlitePool,
        receiver_id: &str,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT
                event_id, id, receiver_id, actor_id, notification_type, target_type, target_id,
                title, message, link, is_read, read_at, created_at
            FROM notifications
            WHERE receiver_id = ?
              AND (? = 0 OR is_read = 0)
            ORDER BY created_at DESC, event_id DESC
            LIMIT ?
            OFFSET ?
            "#,
        )
        .bind(receiver_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn count_by_receiver(
        pool: &SqlitePool,
        receiver_id: &str,
        unread_only: bool,
    ) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE receiver_id = ? AND (? = 0 OR is_read = 0)",
        )
        .bind(receiver_id)
        .bind(unread_only)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Notifications created after `after_event_id`, in creation order.
    pub async fn find_after_event(
        pool: &SqlitePool,
        receiver_id: &str,
        after_event_id: i64,
    ) -> AppResult<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT
                event_id, id, receiver_id, actor_id, notification_type, target_type, target_id,
                title, message, link, is_read, read_at, created_at
            FROM notifications
            WHERE receiver_id = ? AND event_id > ?
            ORDER BY event_id ASC
            "#,
        )
        .bind(receiver_id)
        .bind(after_event_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Fetch a notification only if it belongs to `receiver_id`.
    pub async fn find_owned(
        pool: &SqlitePool,
        id: &str,
        receiver_id: &str,
    ) -> AppResult<Option<Notification>> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT
                event_id, id, receiver_id, actor_id, notification_type, target_type, target_id,
                title, message, link, is_read, read_at, created_at
            FROM notifications
            WHERE id = ? AND receiver_id = ?
            "#,
        )
        .bind(id)
        .bind(receiver_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Mark an unread notification as read. Returns `None` when nothing changed
    /// (already read, missing, or owned by someone else).
    pub async fn mark_read(
        pool: &SqlitePool,
        id: &str,
        receiver_id: &str,
        read_at: NaiveDateTime,
    ) -> AppResult<Option<Notification>> {
        sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET is_read = 1, read_at = ?
            WHERE id = ? AND receiver_id = ? AND is_read = 0
            RETURNING
                event_id, id, receiver_id, actor_id, notification_type, target_type, target_id,
                title, message, link, is_read, read_at, created_at
            "#,
        )
        .bind(read_at)
        .bind(id)
        .bind(receiver_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn mark_all_read(
        pool: &SqlitePool,
        receiver_id: &str,
        read_at: NaiveDateTime,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE receiver_id = ? AND is_read = 0",
        )
        .bind(read_at)
        .bind(receiver_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Delete a notification owned by `receiver_id`. Returns whether a row was removed.
    pub async fn delete_owned(pool: &SqlitePool, id: &str, receiver_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND receiver_id = ?")
            .bind(id)
            .bind(receiver_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}
