use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;

/// Which reminder of an appointment a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum ReminderKind {
    #[serde(rename = "REMIND_24H")]
    #[sqlx(rename = "REMIND_24H")]
    Remind24h,
    #[serde(rename = "REMIND_3H")]
    #[sqlx(rename = "REMIND_3H")]
    Remind3h,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::Remind24h, ReminderKind::Remind3h];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Remind24h => "REMIND_24H",
            ReminderKind::Remind3h => "REMIND_3H",
        }
    }

    /// How long before the appointment the reminder fires.
    pub fn lead_time(&self) -> Duration {
        match self {
            ReminderKind::Remind24h => Duration::hours(24),
            ReminderKind::Remind3h => Duration::hours(3),
        }
    }

    pub fn hours_before(&self) -> i64 {
        self.lead_time().num_hours()
    }
}

/// Reminder job status. Everything except `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    Pending,
    Cancelled,
    Sent,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "PENDING",
            ReminderStatus::Cancelled => "CANCELLED",
            ReminderStatus::Sent => "SENT",
            ReminderStatus::Failed => "FAILED",
        }
    }
}

/// Deterministic key identifying the reminder of `kind` for a reservation.
pub fn reminder_dedupe_key(reservation_id: &str, kind: ReminderKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reservation_id.as_bytes());
    hasher.update(b":");
    hasher.update(kind.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// A persisted time-triggered reminder job.
///
/// While a sweeper dispatches the job it holds a lease (`lease_owner` +
/// `lease_expires_at`); the status stays `Pending` until the sweeper records
/// the terminal outcome.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReservationReminder {
    /// Primary key (UUID)
    pub id: String,

    /// Reservation the reminder belongs to (weak reference).
    pub reservation_id: String,

    /// Member who receives the reminder.
    pub member_id: String,

    pub kind: ReminderKind,

    pub status: ReminderStatus,

    /// When the reminder becomes due.
    pub fire_at: NaiveDateTime,

    /// Unique key derived from (reservation_id, kind).
    pub dedupe_key: String,

    /// Sweeper currently holding the lease, if any.
    pub lease_owner: Option<String>,

    /// Time after which the lease may be reclaimed by another sweeper.
    pub lease_expires_at: Option<NaiveDateTime>,

    /// Dispatch error recorded for FAILED reminders.
    pub last_error: Option<String>,

    pub created_at: NaiveDateTime,

    pub updated_at: NaiveDateTime,
}

/// Data required to schedule a reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReminder {
    pub reservation_id: String,
    pub member_id: String,
    pub kind: ReminderKind,
    pub fire_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_key_is_stable_per_reservation_and_kind() {
        let a = reminder_dedupe_key("r-1", ReminderKind::Remind24h);
        let b = reminder_dedupe_key("r-1", ReminderKind::Remind24h);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, reminder_dedupe_key("r-1", ReminderKind::Remind3h));
        assert_ne!(a, reminder_dedupe_key("r-2", ReminderKind::Remind24h));
    }

    #[test]
    fn lead_times() {
        assert_eq!(ReminderKind::Remind24h.hours_before(), 24);
        assert_eq!(ReminderKind::Remind3h.hours_before(), 3);
    }
}
