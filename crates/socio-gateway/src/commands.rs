use tracing::{debug, info, warn};
use uuid::Uuid;

use socio_core::presence::ConnectionHandle;
use socio_core::{Core, SocioError};
use socio_types::events::{GatewayCommand, GatewayEvent};

/// Execute one client command for the authenticated `username`.
/// `own` is this connection's handle, used for direct replies.
pub async fn handle_command(core: &Core, username: &str, own: &ConnectionHandle, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::SendMessage {
            sender_username,
            text,
            chat_id,
            receiver_username,
        } => {
            if sender_username != username {
                warn!(
                    "{} tried to send as {} in chat {}",
                    username, sender_username, chat_id
                );
                let err = SocioError::Validation("senderUsername does not match the connection".into());
                reply_failure(username, own, chat_id, &err);
                return;
            }

            match core.messages.deliver(chat_id, username, &text).await {
                Ok(delivery) => {
                    if delivery.receiver != receiver_username {
                        debug!(
                            "{} addressed {} but chat {} belongs to {}",
                            username, receiver_username, chat_id, delivery.receiver
                        );
                    }
                    info!(
                        "{} -> {} message {} ({} live connection(s))",
                        username, delivery.receiver, delivery.message.id, delivery.pushed
                    );
                }
                Err(e) => {
                    debug!("{} send-message in chat {} rejected: {}", username, chat_id, e);
                    reply_failure(username, own, chat_id, &e);
                }
            }
        }
    }
}

/// Tell the sender their message was not sent.
fn reply_failure(username: &str, own: &ConnectionHandle, chat_id: Uuid, err: &SocioError) {
    let event = GatewayEvent::SendFailed {
        chat_id,
        error: err.code().to_string(),
        message: err.to_string(),
    };
    if let Err(failure) = own.push(username, event) {
        warn!("{}", failure);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use socio_core::DEFAULT_ACTIVITY_LIMIT;
    use socio_db::{Database, Store};

    fn core() -> (Arc<Database>, Core) {
        let store = Arc::new(Database::open_in_memory().unwrap());
        (store.clone(), Core::new(store, DEFAULT_ACTIVITY_LIMIT))
    }

    fn send(sender: &str, receiver: &str, chat_id: Uuid, text: &str) -> GatewayCommand {
        GatewayCommand::SendMessage {
            sender_username: sender.into(),
            text: text.into(),
            chat_id,
            receiver_username: receiver.into(),
        }
    }

    #[tokio::test]
    async fn send_message_reaches_online_receiver() {
        let (store, core) = core();
        let (alice, mut alice_rx) = ConnectionHandle::new();
        let (bob, mut bob_rx) = ConnectionHandle::new();
        core.presence.register_connection("alice", alice.clone());
        core.presence.register_connection("bob", bob);

        let chat = core.chats.resolve_chat("alice", "bob").await.unwrap();
        handle_command(&core, "alice", &alice, send("alice", "bob", chat.id, "hi")).await;

        match bob_rx.try_recv().unwrap() {
            GatewayEvent::ReceiveMessage { message, receiver_username } => {
                assert_eq!(message.text, "hi");
                assert_eq!(message.sender_username, "alice");
                assert_eq!(receiver_username, "bob");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(store.messages_for_chat(chat.id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn impersonation_is_refused() {
        let (store, core) = core();
        let (mallory, mut mallory_rx) = ConnectionHandle::new();
        let chat = core.chats.resolve_chat("alice", "bob").await.unwrap();

        handle_command(&core, "mallory", &mallory, send("alice", "bob", chat.id, "hi")).await;

        match mallory_rx.try_recv().unwrap() {
            GatewayEvent::SendFailed { error, .. } => assert_eq!(error, "validation_error"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(store.messages_for_chat(chat.id, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocked_sender_is_told_not_sent() {
        let (store, core) = core();
        let (dave, mut dave_rx) = ConnectionHandle::new();
        let chat = core.chats.resolve_chat("carol", "dave").await.unwrap();
        store.set_block("carol", "dave", true).unwrap();

        handle_command(&core, "dave", &dave, send("dave", "carol", chat.id, "hello?")).await;

        match dave_rx.try_recv().unwrap() {
            GatewayEvent::SendFailed { error, chat_id, .. } => {
                assert_eq!(error, "messaging_disallowed");
                assert_eq!(chat_id, chat.id);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(store.messages_for_chat(chat.id, 10).unwrap().is_empty());
    }
}
