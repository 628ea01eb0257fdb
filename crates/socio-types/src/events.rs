use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, NotificationView};

/// Events sent over the real-time channel, server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { username: String },

    /// A persisted message addressed to this user
    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        #[serde(flatten)]
        message: Message,
        receiver_username: String,
    },

    /// A user came online or went offline
    PresenceUpdate { username: String, online: bool },

    /// A new notification for this user
    Notification(NotificationView),

    /// A `send-message` command was rejected before persistence
    #[serde(rename_all = "camelCase")]
    SendFailed {
        chat_id: Uuid,
        error: String,
        message: String,
    },
}

/// Commands sent FROM client TO server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayCommand {
    /// Authenticate the connection
    Identify { token: String },

    /// Persist a message and push it to the receiver's live connections
    #[serde(rename_all = "camelCase")]
    SendMessage {
        sender_username: String,
        text: String,
        chat_id: Uuid,
        receiver_username: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_command_uses_client_names() {
        let chat_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "type": "send-message",
            "data": {
                "senderUsername": "alice",
                "text": "hi",
                "chatId": chat_id,
                "receiverUsername": "bob",
            }
        });

        let cmd: GatewayCommand = serde_json::from_value(raw).unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::SendMessage {
                sender_username: "alice".into(),
                text: "hi".into(),
                chat_id,
                receiver_username: "bob".into(),
            }
        );
    }

    #[test]
    fn receive_message_event_flattens_message() {
        let message = Message {
            id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            sender_username: "alice".into(),
            text: "hi".into(),
            created_at: chrono::Utc::now(),
        };
        let event = GatewayEvent::ReceiveMessage {
            message,
            receiver_username: "bob".into(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "receive-message");
        assert_eq!(json["data"]["text"], "hi");
        assert_eq!(json["data"]["senderUsername"], "alice");
        assert_eq!(json["data"]["receiverUsername"], "bob");
    }
}
