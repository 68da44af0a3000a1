use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Types of notifications produced by the booking and content flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    ReservationAccepted,
    ReservationConfirmed,
    ReservationRejected,
    ReservationCanceled,
    ReservationReminder,
    KeywordMatch,
    Comment,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ReservationAccepted => "RESERVATION_ACCEPTED",
            NotificationType::ReservationConfirmed => "RESERVATION_CONFIRMED",
            NotificationType::ReservationRejected => "RESERVATION_REJECTED",
            NotificationType::ReservationCanceled => "RESERVATION_CANCELED",
            NotificationType::ReservationReminder => "RESERVATION_REMINDER",
            NotificationType::KeywordMatch => "KEYWORD_MATCH",
            NotificationType::Comment => "COMMENT",
        }
    }
}

/// Stored notification. Only `is_read`/`read_at` ever change after insert.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    /// Monotonic replay cursor, assigned by the store on insert.
    pub event_id: i64,
    pub id: String,
    pub receiver_id: String,
    pub actor_id: Option<String>,
    pub notification_type: NotificationType,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub read_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// What a notification points at (a reservation, a post, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    pub target_type: String,
    pub target_id: String,
}

impl NotificationTarget {
    pub fn new(target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            target_id: target_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub receiver_id: String,
    pub actor_id: Option<String>,
    pub notification_type: NotificationType,
    pub target: Option<NotificationTarget>,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}
