use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SocioError {
    /// Malformed or empty input, rejected before any persistence.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{username} is not a member of chat {chat_id}")]
    NotAMember { username: String, chat_id: Uuid },

    #[error("messaging is not allowed in chat {0}")]
    MessagingDisallowed(Uuid),

    #[error("chat between {a} and {b} is blocked")]
    ChatBlocked { a: String, b: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence failed before anything was committed; the whole operation may be retried.
    #[error("store error: {0}")]
    TransientStore(#[from] anyhow::Error),
}

impl SocioError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotAMember { .. } => "not_a_member",
            Self::MessagingDisallowed(_) => "messaging_disallowed",
            Self::ChatBlocked { .. } => "chat_blocked",
            Self::NotFound(_) => "not_found",
            Self::TransientStore(_) => "transient_store_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

pub type SocioResult<T> = Result<T, SocioError>;

/// A push to a live connection failed. Only ever logged: the message is already stored.
#[derive(Debug, Error)]
#[error("push to {username} on connection {conn_id} failed: connection closed")]
pub struct DeliveryFailure {
    pub username: String,
    pub conn_id: Uuid,
}
