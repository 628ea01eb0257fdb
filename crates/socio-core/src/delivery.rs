use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use socio_types::events::GatewayEvent;
use socio_types::models::Message;

use crate::error::{SocioError, SocioResult};
use crate::presence::PresenceRegistry;
use crate::resolver::pair_blocked;
use crate::{SharedStore, blocking, now};

/// Default and maximum page size for chat history.
pub const DEFAULT_HISTORY_LIMIT: u32 = 200;
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// Persists messages, then pushes them to the receiver's live connections.
#[derive(Clone)]
pub struct MessagePipeline {
    store: SharedStore,
    presence: PresenceRegistry,
    /// One FIFO lane per (chat, sender): sends from the same sender on the
    /// same chat are persisted and pushed in call order.
    lanes: Arc<Mutex<LaneMap>>,
}

type LaneKey = (Uuid, String);
type LaneMap = HashMap<LaneKey, Arc<tokio::sync::Mutex<()>>>;

/// A place in one sender's lane. Dropping it, including when the send is
/// cancelled mid-flight, removes the lane once nobody else is queued on it.
struct LaneTicket {
    lanes: Arc<Mutex<LaneMap>>,
    key: LaneKey,
    lane: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LaneTicket {
    fn drop(&mut self) {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        // Two references left: the map's and ours
        let last = Arc::strong_count(&self.lane) == 2
            && lanes.get(&self.key).is_some_and(|held| Arc::ptr_eq(held, &self.lane));
        if last {
            lanes.remove(&self.key);
        }
    }
}

/// A stored message and how many live connections it reached.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub receiver: String,
    pub pushed: usize,
}

impl MessagePipeline {
    pub fn new(store: SharedStore, presence: PresenceRegistry) -> Self {
        Self {
            store,
            presence,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn send_message(&self, chat_id: Uuid, sender: &str, text: &str) -> SocioResult<Message> {
        self.deliver(chat_id, sender, text).await.map(|d| d.message)
    }

    /// Store first, push second: a failed push never loses the message.
    pub async fn deliver(&self, chat_id: Uuid, sender: &str, text: &str) -> SocioResult<Delivery> {
        if text.trim().is_empty() {
            return Err(SocioError::Validation("message text must not be empty".into()));
        }

        let ticket = self.lane(chat_id, sender);
        let _turn = ticket.lane.lock().await;
        self.persist_and_push(chat_id, sender, text).await
    }

    /// Chronological history of a chat, visible to its members only.
    pub async fn history(&self, chat_id: Uuid, viewer: &str, limit: u32) -> SocioResult<Vec<Message>> {
        let viewer = viewer.to_string();
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        blocking(&self.store, move |store| {
            let chat = store
                .get_chat(chat_id)?
                .ok_or_else(|| SocioError::NotFound(format!("chat {}", chat_id)))?;
            if !chat.is_member(&viewer) {
                return Err(SocioError::NotAMember { username: viewer, chat_id });
            }
            Ok(store.messages_for_chat(chat_id, limit)?)
        })
        .await
    }

    async fn persist_and_push(&self, chat_id: Uuid, sender: &str, text: &str) -> SocioResult<Delivery> {
        let message = Message {
            id: Uuid::new_v4(),
            chat_id,
            sender_username: sender.to_string(),
            text: text.to_string(),
            created_at: now(),
        };

        let stored = message.clone();
        let receiver = blocking(&self.store, move |store| {
            let chat = store
                .get_chat(chat_id)?
                .ok_or_else(|| SocioError::NotFound(format!("chat {}", chat_id)))?;

            let receiver = chat
                .other_member(&stored.sender_username)
                .ok_or_else(|| SocioError::NotAMember {
                    username: stored.sender_username.clone(),
                    chat_id,
                })?
                .to_string();

            if !chat.allow_message {
                return Err(SocioError::MessagingDisallowed(chat_id));
            }
            if pair_blocked(store, &stored.sender_username, &receiver)? {
                store.set_chat_allow_message(chat_id, false)?;
                return Err(SocioError::MessagingDisallowed(chat_id));
            }

            store.insert_message(&stored)?;

            // The message is durable from here on; a stale timestamp only affects chat ordering
            if let Err(e) = store.touch_chat(chat_id, stored.created_at) {
                warn!("Failed to bump updated_at on chat {}: {}", chat_id, e);
            }

            Ok(receiver)
        })
        .await?;

        let event = GatewayEvent::ReceiveMessage {
            message: message.clone(),
            receiver_username: receiver.clone(),
        };
        let (pushed, failures) = self.presence.push_to_user(&receiver, &event);
        for failure in failures {
            warn!("Delivery failure for message {}: {}", message.id, failure);
        }

        debug!(
            "Message {} in chat {} from {} stored, pushed to {} connection(s)",
            message.id, chat_id, sender, pushed
        );

        Ok(Delivery {
            message,
            receiver,
            pushed,
        })
    }

    fn lane(&self, chat_id: Uuid, sender: &str) -> LaneTicket {
        let key = (chat_id, sender.to_string());
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            lanes.entry(key.clone()).or_default().clone()
        };
        LaneTicket {
            lanes: self.lanes.clone(),
            key,
            lane,
        }
    }
}
