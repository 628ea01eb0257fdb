use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile data owned by the external user subsystem. The core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub user_picture: Option<String>,
}

/// A two-party conversation, unique per unordered member pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "chatId")]
    pub id: Uuid,
    pub members: [String; 2],
    pub allow_message: bool,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m == username)
    }

    /// The member that is not `username`, if `username` belongs to the chat.
    pub fn other_member(&self, username: &str) -> Option<&str> {
        match &self.members {
            [a, b] if a == username => Some(b),
            [a, b] if b == username => Some(a),
            _ => None,
        }
    }
}

/// Canonical storage key for a member pair: lexicographically sorted.
pub fn member_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Like,
    Comment,
    Follow,
    Mention,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Follow => "follow",
            Self::Mention => "mention",
        }
    }
}

impl FromStr for ActionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "comment" => Ok(Self::Comment),
            "follow" => Ok(Self::Follow),
            "mention" => Ok(Self::Mention),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub action_type: ActionType,
    pub post_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification joined with the sender's display data, as rendered by clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sender_username: String,
    pub first_name: String,
    pub last_name: String,
    pub user_picture: Option<String>,
    pub action_type: ActionType,
    pub post_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Kind of entry in a user's recent-activity feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Post,
    Like,
    Comment,
    Follow,
    Bookmark,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Follow => "follow",
            Self::Bookmark => "bookmark",
        }
    }

    /// The notification another user receives for this activity, if any.
    pub fn notifies(self) -> Option<ActionType> {
        match self {
            Self::Like => Some(ActionType::Like),
            Self::Comment => Some(ActionType::Comment),
            Self::Follow => Some(ActionType::Follow),
            Self::Post | Self::Bookmark => None,
        }
    }
}

impl FromStr for ActivityKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(Self::Post),
            "like" => Ok(Self::Like),
            "comment" => Ok(Self::Comment),
            "follow" => Ok(Self::Follow),
            "bookmark" => Ok(Self::Bookmark),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// Post id or username the activity points at.
    pub target: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Returned when a stored enum column holds a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}
