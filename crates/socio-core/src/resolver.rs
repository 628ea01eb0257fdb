use tracing::{debug, info};
use uuid::Uuid;

use socio_db::Store;
use socio_types::models::Chat;

use crate::error::{SocioError, SocioResult};
use crate::{SharedStore, blocking, now};

/// Maps an unordered pair of users to their one Chat.
#[derive(Clone)]
pub struct ChatResolver {
    store: SharedStore,
}

enum Resolution {
    Ready(Chat),
    Blocked,
}

impl ChatResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Return the chat for `{a, b}`, creating it on first contact.
    ///
    /// Safe to retry. Concurrent first contact between the same pair yields a
    /// single record: creation is an insert-or-fetch on the sorted member pair.
    pub async fn resolve_chat(&self, a: &str, b: &str) -> SocioResult<Chat> {
        validate_pair(a, b)?;

        let (a, b) = (a.to_string(), b.to_string());
        let (ra, rb) = (a.clone(), b.clone());
        let resolution = blocking(&self.store, move |store| {
            if pair_blocked(store, &ra, &rb)? {
                // Keep the stored gate in step so history readers see it closed
                if let Some(chat) = store.find_chat_by_pair(&ra, &rb)? {
                    if chat.allow_message {
                        store.set_chat_allow_message(chat.id, false)?;
                    }
                }
                return Ok(Resolution::Blocked);
            }

            let candidate = Chat {
                id: Uuid::new_v4(),
                members: [ra, rb],
                allow_message: true,
                updated_at: now(),
            };
            let mut chat = store.insert_or_fetch_chat(&candidate)?;
            if chat.id == candidate.id {
                info!("Created chat {} for {} and {}", chat.id, chat.members[0], chat.members[1]);
            } else if !chat.allow_message {
                // The block was lifted since the gate closed
                store.set_chat_allow_message(chat.id, true)?;
                chat.allow_message = true;
            }
            Ok(Resolution::Ready(chat))
        })
        .await?;

        match resolution {
            Resolution::Ready(chat) => Ok(chat),
            Resolution::Blocked => {
                debug!("Chat between {} and {} refused: blocked", a, b);
                Err(SocioError::ChatBlocked { a, b })
            }
        }
    }

    pub async fn get_chat(&self, chat_id: Uuid) -> SocioResult<Chat> {
        blocking(&self.store, move |store| {
            store
                .get_chat(chat_id)?
                .ok_or_else(|| SocioError::NotFound(format!("chat {}", chat_id)))
        })
        .await
    }

    /// Chats `username` takes part in, newest-updated first.
    pub async fn chats_for(&self, username: &str) -> SocioResult<Vec<Chat>> {
        let username = username.to_string();
        blocking(&self.store, move |store| Ok(store.chats_for_user(&username)?)).await
    }
}

/// True if either party currently blocks the other.
pub(crate) fn pair_blocked(store: &dyn Store, a: &str, b: &str) -> SocioResult<bool> {
    Ok(store.is_blocked(a, b)? || store.is_blocked(b, a)?)
}

fn validate_pair(a: &str, b: &str) -> SocioResult<()> {
    if a.trim().is_empty() || b.trim().is_empty() {
        return Err(SocioError::Validation("usernames must not be empty".into()));
    }
    if a == b {
        return Err(SocioError::Validation("a chat needs two distinct users".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::memory_store;

    #[tokio::test]
    async fn resolution_is_pair_order_independent() {
        let store = memory_store();
        let resolver = ChatResolver::new(store.clone());

        let ab = resolver.resolve_chat("alice", "bob").await.unwrap();
        let ba = resolver.resolve_chat("bob", "alice").await.unwrap();
        let again = resolver.resolve_chat("alice", "bob").await.unwrap();

        assert_eq!(ab.id, ba.id);
        assert_eq!(ab.id, again.id);
        assert!(ab.allow_message);
        assert_eq!(store.chats_for_user("alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_contact_creates_one_chat() {
        let store = memory_store();
        let resolver = ChatResolver::new(store.clone());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let resolver = resolver.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    resolver.resolve_chat("alice", "bob").await
                } else {
                    resolver.resolve_chat("bob", "alice").await
                }
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.chats_for_user("bob").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blocked_pair_is_refused_without_creating_a_chat() {
        let store = memory_store();
        store.set_block("carol", "dave", true).unwrap();
        let resolver = ChatResolver::new(store.clone());

        let err = resolver.resolve_chat("dave", "carol").await.unwrap_err();
        assert!(matches!(err, SocioError::ChatBlocked { .. }));
        assert!(store.find_chat_by_pair("carol", "dave").unwrap().is_none());
    }

    #[tokio::test]
    async fn block_after_creation_closes_the_gate_and_unblock_reopens_it() {
        let store = memory_store();
        let resolver = ChatResolver::new(store.clone());
        let chat = resolver.resolve_chat("carol", "dave").await.unwrap();

        store.set_block("carol", "dave", true).unwrap();
        assert!(resolver.resolve_chat("carol", "dave").await.is_err());
        assert!(!resolver.get_chat(chat.id).await.unwrap().allow_message);

        store.set_block("carol", "dave", false).unwrap();
        let reopened = resolver.resolve_chat("dave", "carol").await.unwrap();
        assert_eq!(reopened.id, chat.id);
        assert!(reopened.allow_message);
    }

    #[tokio::test]
    async fn self_chat_and_blank_names_are_rejected() {
        let resolver = ChatResolver::new(memory_store());

        assert!(matches!(
            resolver.resolve_chat("alice", "alice").await,
            Err(SocioError::Validation(_))
        ));
        assert!(matches!(
            resolver.resolve_chat(" ", "alice").await,
            Err(SocioError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_chat_is_not_found() {
        let resolver = ChatResolver::new(Arc::new(socio_db::Database::open_in_memory().unwrap()));
        assert!(matches!(
            resolver.get_chat(Uuid::new_v4()).await,
            Err(SocioError::NotFound(_))
        ));
    }
}
