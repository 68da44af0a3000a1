use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{CreateNotification, Notification, NotificationRepository};
use crate::error::{AppError, AppResult};
use crate::services::live::LiveChannelRegistry;
use crate::AppState;

/// One page of a member's notifications.
#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Live stream of a member's notifications: replayed backlog first, then pushes.
pub type NotificationStream = BoxStream<'static, Notification>;

/// Persists notifications and delivers them to connected clients.
#[derive(Clone)]
pub struct NotificationHub {
    pool: SqlitePool,
    live: Arc<LiveChannelRegistry>,
}

impl NotificationHub {
    pub fn new(pool: SqlitePool, live: Arc<LiveChannelRegistry>) -> Self {
        Self { pool, live }
    }

    pub fn from_state(state: &Arc<AppState>) -> Self {
        Self::new(state.db.clone(), state.live.clone())
    }

    /// Store a notification and push it to the receiver's open channels.
    ///
    /// Not being connected is not an error: the notification stays queryable
    /// and is replayed on the next reconnect.
    pub async fn create_and_push(&self, cmd: CreateNotification) -> AppResult<Notification> {
        validate_command(&cmd)?;

        let notification = NotificationRepository::create(&self.pool, cmd).await?;
        let delivered = self.live.push(&notification);

        tracing::debug!(
            "Notification {} (event {}, type {}) stored for member {}, pushed to {} channel(s)",
            notification.id,
            notification.event_id,
            notification.notification_type.as_str(),
            notification.receiver_id,
            delivered
        );

        Ok(notification)
    }

    /// Side-channel notification: failures are logged and swallowed so they
    /// never abort the flow that triggered them.
    pub async fn notify_best_effort(&self, cmd: CreateNotification) -> Option<Notification> {
        let receiver_id = cmd.receiver_id.clone();
        let notification_type = cmd.notification_type;
        match self.create_and_push(cmd).await {
            Ok(notification) => Some(notification),
            Err(e) => {
                tracing::warn!(
                    "Failed to create {} notification for member {}: {:?}",
                    notification_type.as_str(),
                    receiver_id,
                    e
                );
                None
            }
        }
    }

    pub async fn list_for(
        &self,
        member_id: &str,
        unread_only: bool,
        page: i64,
        per_page: i64,
    ) -> AppResult<NotificationPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let offset = (page - 1).saturating_mul(per_page);

        let items = NotificationRepository::find_by_receiver(
            &self.pool,
            member_id,
            unread_only,
            per_page,
            offset,
        )
        .await?;
        let total =
            NotificationRepository::count_by_receiver(&self.pool, member_id, unread_only).await?;
        let total_pages = (total + per_page - 1) / per_page;

        Ok(NotificationPage {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    /// Mark one notification read. Repeating the call keeps the first `read_at`.
    pub async fn mark_read(&self, member_id: &str, notification_id: &str) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        if let Some(updated) =
            NotificationRepository::mark_read(&self.pool, notification_id, member_id, now).await?
        {
            return Ok(updated);
        }

        NotificationRepository::find_owned(&self.pool, notification_id, member_id)
            .await?
            .ok_or_else(|| AppError::NotFound(crate::i18n::t("not_found.notification")))
    }

    pub async fn mark_all_read(&self, member_id: &str) -> AppResult<u64> {
        let now = Utc::now().naive_utc();
        let updated = NotificationRepository::mark_all_read(&self.pool, member_id, now).await?;
        tracing::debug!("Marked {} notification(s) read for member {}", updated, member_id);
        Ok(updated)
    }

    pub async fn count_unread(&self, member_id: &str) -> AppResult<i64> {
        NotificationRepository::count_by_receiver(&self.pool, member_id, true).await
    }

    pub async fn delete(&self, member_id: &str, notification_id: &str) -> AppResult<()> {
        if NotificationRepository::delete_owned(&self.pool, notification_id, member_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(crate::i18n::t("not_found.notification")))
        }
    }

    /// Open a live stream for `member_id`.
    ///
    /// The channel is registered before the backlog query so nothing created
    /// in between is lost. With `last_event_id`, every notification after it is
    /// replayed in creation order before live pushes; pushes already covered by
    /// the replay are skipped. Delivery is at-least-once across reconnects.
    pub async fn connect(
        &self,
        member_id: &str,
        last_event_id: Option<i64>,
    ) -> AppResult<NotificationStream> {
        let channel = self.live.register(member_id);

        let backlog = match last_event_id {
            Some(after) => {
                NotificationRepository::find_after_event(&self.pool, member_id, after).await?
            }
            None => Vec::new(),
        };
        let watermark = backlog.last().map(|n| n.event_id).or(last_event_id);

        tracing::info!(
            "Member {} connected on channel {} (last_event_id={:?}, replaying {})",
            member_id,
            channel.channel_id(),
            last_event_id,
            backlog.len()
        );

        let live = stream::unfold(channel, move |mut channel| async move {
            loop {
                let next = channel.recv().await?;
                if watermark.map_or(true, |w| next.event_id > w) {
                    return Some((next, channel));
                }
            }
        });

        Ok(stream::iter(backlog).chain(live).boxed())
    }
}

fn validate_command(cmd: &CreateNotification) -> AppResult<()> {
    if cmd.receiver_id.trim().is_empty() {
        return Err(AppError::Validation(crate::i18n::t(
            "validation.notification_receiver_required",
        )));
    }
    if cmd.title.trim().is_empty() {
        return Err(AppError::Validation(crate::i18n::t(
            "validation.notification_title_required",
        )));
    }
    Ok(())
}
