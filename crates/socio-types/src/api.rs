use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ActivityKind;

// -- JWT Claims --

/// Bearer token claims. Tokens are issued by the external auth subsystem;
/// both the REST middleware and the WebSocket `Identify` handshake verify them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the authenticated user.
    pub sub: String,
    pub exp: usize,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResolveChatRequest {
    pub receiver_username: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub sender_username: String,
    pub text: String,
    pub chat_id: Uuid,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub count: usize,
}

// -- Activities --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordActivityRequest {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(default)]
    pub target: Option<String>,
    /// Owner of the target; notified for likes, comments and follows.
    #[serde(default)]
    pub receiver_username: Option<String>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
