//! In-process registry of live notification channels.
//!
//! Each connected client owns one bounded channel; a member may hold several
//! (one per browser tab). Pushes never block: a channel that is full or whose
//! receiver went away is pruned, and its client recovers the missed events by
//! reconnecting with its last seen event id.
//!
//! The registry only reaches clients connected to this process. Running more
//! than one instance needs an external fan-out, which this module does not do.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::db::Notification;

type ChannelMap = HashMap<String, HashMap<Uuid, mpsc::Sender<Notification>>>;

pub struct LiveChannelRegistry {
    channels: RwLock<ChannelMap>,
    buffer: usize,
}

impl LiveChannelRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Open a channel for `receiver_id`. The channel deregisters itself when dropped.
    pub fn register(self: &Arc<Self>, receiver_id: &str) -> LiveChannel {
        let (tx, rx) = mpsc::channel(self.buffer);
        let channel_id = Uuid::new_v4();

        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(receiver_id.to_string())
            .or_default()
            .insert(channel_id, tx);

        tracing::debug!(
            "Live channel {} opened for member {} ({} open)",
            channel_id,
            receiver_id,
            channels.get(receiver_id).map(|c| c.len()).unwrap_or(0)
        );

        LiveChannel {
            receiver_id: receiver_id.to_string(),
            channel_id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Push a notification to every open channel of its receiver.
    ///
    /// Returns the number of channels that accepted the event.
    pub fn push(&self, notification: &Notification) -> usize {
        let receiver_id = notification.receiver_id.as_str();
        let mut delivered = 0usize;
        let mut broken: Vec<Uuid> = Vec::new();

        {
            let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
            let Some(member_channels) = channels.get(receiver_id) else {
                tracing::debug!(
                    "Member {} has no live channel; notification {} stays queryable",
                    receiver_id,
                    notification.id
                );
                return 0;
            };

            for (channel_id, tx) in member_channels {
                match tx.try_send(notification.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            "Live channel {} of member {} is full; dropping it",
                            channel_id,
                            receiver_id
                        );
                        broken.push(*channel_id);
                    }
                    Err(TrySendError::Closed(_)) => broken.push(*channel_id),
                }
            }
        }

        for channel_id in broken {
            self.deregister(receiver_id, channel_id);
        }

        delivered
    }

    pub fn deregister(&self, receiver_id: &str, channel_id: Uuid) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        if let Some(member_channels) = channels.get_mut(receiver_id) {
            if member_channels.remove(&channel_id).is_some() {
                tracing::debug!(
                    "Live channel {} closed for member {}",
                    channel_id,
                    receiver_id
                );
            }
            if member_channels.is_empty() {
                channels.remove(receiver_id);
            }
        }
    }

    #[cfg(test)]
    pub fn connection_count(&self, receiver_id: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(receiver_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Drop every channel; open streams end once their buffers drain.
    pub fn close_all(&self) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let count: usize = channels.values().map(|c| c.len()).sum();
        channels.clear();
        tracing::info!("Closed {} live channel(s)", count);
    }
}

/// Receiving side of one live connection.
pub struct LiveChannel {
    receiver_id: String,
    channel_id: Uuid,
    rx: mpsc::Receiver<Notification>,
    registry: Arc<LiveChannelRegistry>,
}

impl LiveChannel {
    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    /// Next pushed notification, or `None` once the channel was closed.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.registry.deregister(&self.receiver_id, self.channel_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NotificationType;
    use chrono::Utc;

    fn notification(receiver: &str, event_id: i64) -> Notification {
        Notification {
            event_id,
            id: format!("n-{}", event_id),
            receiver_id: receiver.to_string(),
            actor_id: None,
            notification_type: NotificationType::Comment,
            target_type: None,
            target_id: None,
            title: "title".to_string(),
            message: "message".to_string(),
            link: None,
            is_read: false,
            read_at: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn pushes_to_every_tab_of_the_receiver() {
        let registry = Arc::new(LiveChannelRegistry::new(8));
        let mut tab_a = registry.register("alice");
        let mut tab_b = registry.register("alice");
        let mut other = registry.register("bob");

        assert_eq!(registry.push(&notification("alice", 1)), 2);
        assert_eq!(tab_a.recv().await.unwrap().event_id, 1);
        assert_eq!(tab_b.recv().await.unwrap().event_id, 1);
        assert!(other.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_channel_deregisters() {
        let registry = Arc::new(LiveChannelRegistry::new(8));
        let tab = registry.register("alice");
        assert_eq!(registry.connection_count("alice"), 1);
        drop(tab);
        assert_eq!(registry.connection_count("alice"), 0);
        assert_eq!(registry.push(&notification("alice", 1)), 0);
    }

    #[tokio::test]
    async fn full_channel_is_pruned_without_blocking_others() {
        let registry = Arc::new(LiveChannelRegistry::new(1));
        let _slow = registry.register("alice");
        let mut fast = registry.register("alice");

        assert_eq!(registry.push(&notification("alice", 1)), 2);
        assert_eq!(fast.recv().await.unwrap().event_id, 1);

        // The slow tab never drained its single slot.
        assert_eq!(registry.push(&notification("alice", 2)), 1);
        assert_eq!(registry.connection_count("alice"), 1);
        assert_eq!(fast.recv().await.unwrap().event_id, 2);
    }

    #[tokio::test]
    async fn close_all_ends_streams() {
        let registry = Arc::new(LiveChannelRegistry::new(4));
        let mut tab = registry.register("alice");
        registry.close_all();
        assert!(tab.recv().await.is_none());
    }
}
