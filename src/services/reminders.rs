//! Persisted appointment reminders and the sweep that delivers them.
//!
//! A reminder is identified by its dedupe key (reservation + kind), so
//! scheduling twice is a no-op. The sweep leases one due reminder at a time;
//! the lease is a compare-and-swap on `lease_owner`/`lease_expires_at`, which
//! keeps two sweepers (tasks or processes) from dispatching the same job. A
//! sweeper that dies mid-dispatch leaves an expiring lease behind, so the job
//! is picked up again later: delivery is at-least-once.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{
    CreateNotification, CreateReminder, DirectoryRepository, HospitalReservationRepository,
    NotificationTarget, NotificationType, ReminderKind, ReminderRepository, ReminderStatus,
    ReservationReminder,
};
use crate::error::{AppError, AppResult};
use crate::services::notifications::NotificationHub;
use crate::AppState;

/// Delivers one due reminder. An `Err` marks the reminder FAILED.
#[async_trait]
pub trait ReminderDispatcher: Send + Sync {
    async fn dispatch(&self, reminder: &ReservationReminder) -> AppResult<()>;
}

/// Outcome counters of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub leased: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct ReminderScheduler {
    pool: SqlitePool,
    worker_id: String,
    lease: Duration,
    batch_size: u32,
}

impl ReminderScheduler {
    pub fn new(pool: SqlitePool, lease: Duration, batch_size: u32) -> Self {
        Self {
            pool,
            worker_id: format!("sweeper-{}", Uuid::new_v4()),
            lease,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_state(state: &Arc<AppState>) -> Self {
        Self::new(
            state.db.clone(),
            Duration::seconds(state.config.reminder.lease_seconds),
            state.config.reminder.batch_size,
        )
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Schedule a reminder. Returns `false` when it was already scheduled.
    pub async fn schedule(
        &self,
        reservation_id: &str,
        member_id: &str,
        kind: ReminderKind,
        fire_at: NaiveDateTime,
    ) -> AppResult<bool> {
        let created = ReminderRepository::create_if_absent(
            &self.pool,
            CreateReminder {
                reservation_id: reservation_id.to_string(),
                member_id: member_id.to_string(),
                kind,
                fire_at,
            },
        )
        .await?;

        match created {
            Some(reminder) => {
                tracing::debug!(
                    "Scheduled {} for reservation {} at {}",
                    kind.as_str(),
                    reservation_id,
                    reminder.fire_at
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Schedule every reminder kind for an appointment, skipping those whose
    /// fire time has already passed. Returns how many were newly scheduled.
    pub async fn schedule_for_appointment(
        &self,
        reservation_id: &str,
        member_id: &str,
        appointment_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> AppResult<usize> {
        let mut scheduled = 0;
        for kind in ReminderKind::ALL {
            let fire_at = appointment_at - kind.lead_time();
            if fire_at <= now {
                tracing::debug!(
                    "Skipping {} for reservation {}: fire time {} already passed",
                    kind.as_str(),
                    reservation_id,
                    fire_at
                );
                continue;
            }
            if self.schedule(reservation_id, member_id, kind, fire_at).await? {
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }

    /// Cancel every PENDING reminder of a reservation that is not being dispatched.
    pub async fn cancel_all_pending(&self, reservation_id: &str) -> AppResult<u64> {
        let now = Utc::now().naive_utc();
        let cancelled =
            ReminderRepository::cancel_pending_for_reservation(&self.pool, reservation_id, now)
                .await?;
        if cancelled > 0 {
            tracing::info!(
                "Cancelled {} pending reminder(s) of reservation {}",
                cancelled,
                reservation_id
            );
        }
        Ok(cancelled)
    }

    pub async fn list_for_reservation(
        &self,
        reservation_id: &str,
    ) -> AppResult<Vec<ReservationReminder>> {
        ReminderRepository::find_by_reservation(&self.pool, reservation_id).await
    }

    /// Lease and dispatch due reminders one by one, up to the batch size.
    ///
    /// A failing dispatch marks only that reminder FAILED; the sweep goes on.
    pub async fn sweep(
        &self,
        dispatcher: &dyn ReminderDispatcher,
        now: NaiveDateTime,
    ) -> AppResult<SweepReport> {
        let mut report = SweepReport::default();

        while report.leased < self.batch_size as usize {
            let Some(reminder) = ReminderRepository::lease_next_due(
                &self.pool,
                &self.worker_id,
                now,
                now + self.lease,
            )
            .await?
            else {
                break;
            };
            report.leased += 1;

            let (status, last_error) = match dispatcher.dispatch(&reminder).await {
                Ok(()) => (ReminderStatus::Sent, None),
                Err(e) => {
                    tracing::warn!(
                        "Reminder {} ({} of reservation {}) failed: {:?}",
                        reminder.id,
                        reminder.kind.as_str(),
                        reminder.reservation_id,
                        e
                    );
                    (ReminderStatus::Failed, Some(e.to_string()))
                }
            };

            let recorded = ReminderRepository::complete_lease(
                &self.pool,
                &reminder.id,
                &self.worker_id,
                status,
                last_error,
            )
            .await?;

            if !recorded {
                tracing::warn!(
                    "Lease on reminder {} expired before its outcome was recorded",
                    reminder.id
                );
                continue;
            }

            match status {
                ReminderStatus::Sent => report.sent += 1,
                _ => report.failed += 1,
            }
        }

        if report.leased > 0 {
            tracing::info!(
                "Reminder sweep {}: leased {}, sent {}, failed {}",
                self.worker_id,
                report.leased,
                report.sent,
                report.failed
            );
        }

        Ok(report)
    }
}

/// Dispatches reminders as `RESERVATION_REMINDER` notifications.
pub struct ReminderNotifier {
    pool: SqlitePool,
    hub: NotificationHub,
}

impl ReminderNotifier {
    pub fn new(pool: SqlitePool, hub: NotificationHub) -> Self {
        Self { pool, hub }
    }

    pub fn from_state(state: &Arc<AppState>) -> Self {
        Self::new(state.db.clone(), NotificationHub::from_state(state))
    }
}

#[async_trait]
impl ReminderDispatcher for ReminderNotifier {
    async fn dispatch(&self, reminder: &ReservationReminder) -> AppResult<()> {
        let reservation =
            HospitalReservationRepository::find_by_id(&self.pool, &reminder.reservation_id)
                .await?
                .ok_or_else(|| AppError::NotFound(crate::i18n::t("not_found.reservation")))?;
        if !reservation.status.is_active() {
            let status = reservation.status.to_string();
            return Err(AppError::InvalidTransition(crate::i18n::t_with(
                "transition.reminder_inactive",
                &[("status", status.as_str())],
            )));
        }

        let venue_name = DirectoryRepository::find_venue(&self.pool, &reservation.venue_id)
            .await?
            .map(|v| v.name)
            .unwrap_or_else(|| reservation.venue_id.clone());
        let hours = reminder.kind.hours_before().to_string();
        let time = reservation.appointment_at.format("%Y-%m-%d %H:%M").to_string();

        self.hub
            .create_and_push(CreateNotification {
                receiver_id: reminder.member_id.clone(),
                actor_id: None,
                notification_type: NotificationType::ReservationReminder,
                target: Some(NotificationTarget::new("HOSPITAL_RESERVATION", &reservation.id)),
                title: crate::i18n::t_with("messages.reminder.title", &[("hours", hours.as_str())]),
                message: crate::i18n::t_with(
                    "messages.reminder.body",
                    &[
                        ("venue", venue_name.as_str()),
                        ("time", time.as_str()),
                        ("pet", reservation.pet_name.as_str()),
                    ],
                ),
                link: Some(format!("/reservations/hospital/{}", reservation.id)),
            })
            .await?;

        Ok(())
    }
}
