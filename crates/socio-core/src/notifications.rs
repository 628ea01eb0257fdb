use tracing::{debug, warn};
use uuid::Uuid;

use socio_db::store::ReadTransition;
use socio_types::events::GatewayEvent;
use socio_types::models::{ActionType, Notification, NotificationView};

use crate::error::{SocioError, SocioResult};
use crate::presence::PresenceRegistry;
use crate::{SharedStore, blocking, now};

/// Creates notifications for actions elsewhere in the system and owns their
/// read state. The persisted `is_read` flag is the only source of truth:
/// clients holding optimistic copies re-fetch after mutating.
#[derive(Clone)]
pub struct NotificationEngine {
    store: SharedStore,
    presence: PresenceRegistry,
}

impl NotificationEngine {
    pub fn new(store: SharedStore, presence: PresenceRegistry) -> Self {
        Self { store, presence }
    }

    /// Persist a notification and push it to the receiver's live sessions.
    pub async fn emit(
        &self,
        sender: &str,
        receiver: &str,
        action_type: ActionType,
        post_id: Option<&str>,
    ) -> SocioResult<Notification> {
        if sender.trim().is_empty() || receiver.trim().is_empty() {
            return Err(SocioError::Validation("sender and receiver are required".into()));
        }
        if sender == receiver {
            return Err(SocioError::Validation("users are not notified of their own actions".into()));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            action_type,
            post_id: post_id.map(str::to_string),
            is_read: false,
            created_at: now(),
        };

        let stored = notification.clone();
        let view = blocking(&self.store, move |store| {
            store.insert_notification(&stored)?;
            // The notification is stored; a missing view only skips the live push
            Ok(store.notification_view(stored.id).unwrap_or_else(|e| {
                warn!("Failed to load view for notification {}: {}", stored.id, e);
                None
            }))
        })
        .await?;

        if let Some(view) = view {
            let (pushed, failures) = self
                .presence
                .push_to_user(receiver, &GatewayEvent::Notification(view));
            for failure in failures {
                warn!("Delivery failure for notification {}: {}", notification.id, failure);
            }
            debug!(
                "Notification {} ({}) {} -> {} pushed to {} connection(s)",
                notification.id,
                action_type.as_str(),
                sender,
                receiver,
                pushed
            );
        }

        Ok(notification)
    }

    /// Producer entry point: never fails the triggering action.
    pub async fn notify(
        &self,
        sender: &str,
        receiver: &str,
        action_type: ActionType,
        post_id: Option<&str>,
    ) -> Option<Notification> {
        match self.emit(sender, receiver, action_type, post_id).await {
            Ok(notification) => Some(notification),
            Err(SocioError::Validation(reason)) => {
                debug!("Notification {} -> {} skipped: {}", sender, receiver, reason);
                None
            }
            Err(e) => {
                warn!(
                    "Failed to create {} notification {} -> {}: {}",
                    action_type.as_str(),
                    sender,
                    receiver,
                    e
                );
                None
            }
        }
    }

    /// Newest first, with sender display data.
    pub async fn list(&self, receiver: &str) -> SocioResult<Vec<NotificationView>> {
        let receiver = receiver.to_string();
        blocking(&self.store, move |store| Ok(store.notifications_for(&receiver)?)).await
    }

    pub async fn get(&self, id: Uuid) -> SocioResult<Notification> {
        blocking(&self.store, move |store| {
            store
                .get_notification(id)?
                .ok_or_else(|| SocioError::NotFound(format!("notification {}", id)))
        })
        .await
    }

    /// Idempotent: an already-read notification is a successful no-op.
    pub async fn mark_read(&self, id: Uuid) -> SocioResult<()> {
        let transition = blocking(&self.store, move |store| Ok(store.mark_notification_read(id)?)).await?;
        match transition {
            ReadTransition::Marked | ReadTransition::AlreadyRead => Ok(()),
            ReadTransition::NotFound => Err(SocioError::NotFound(format!("notification {}", id))),
        }
    }

    /// Mark read on behalf of `receiver`; other users' notifications look absent.
    pub async fn mark_read_for(&self, receiver: &str, id: Uuid) -> SocioResult<()> {
        let notification = self.get(id).await?;
        if notification.receiver != receiver {
            return Err(SocioError::NotFound(format!("notification {}", id)));
        }
        self.mark_read(id).await
    }

    /// Best-effort bulk read. Each notification is written on its own; a failed
    /// write is logged and left unread for a later retry, successes are kept.
    /// Returns how many notifications this call moved from unread to read.
    pub async fn mark_all_read(&self, receiver: &str) -> SocioResult<usize> {
        let owner = receiver.to_string();
        let unread = blocking(&self.store, move |store| Ok(store.unread_notification_ids(&owner)?)).await?;

        let mut count = 0;
        for id in unread {
            match blocking(&self.store, move |store| Ok(store.mark_notification_read(id)?)).await {
                Ok(ReadTransition::Marked) => count += 1,
                // Raced with a single mark_read; not ours to count
                Ok(ReadTransition::AlreadyRead) | Ok(ReadTransition::NotFound) => {}
                Err(e) => warn!("Failed to mark notification {} read for {}: {}", id, receiver, e),
            }
        }

        debug!("Marked {} notification(s) read for {}", count, receiver);
        Ok(count)
    }
}
