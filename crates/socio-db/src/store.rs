use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use socio_types::models::{Activity, Chat, Message, Notification, NotificationView, UserProfile};

/// Outcome of a single read-state write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTransition {
    /// The notification went from unread to read.
    Marked,
    /// The notification was already read; nothing changed.
    AlreadyRead,
    NotFound,
}

/// Durable record access consumed by the engines.
///
/// Every method is a blocking call; async callers run it on the blocking pool.
/// Each method is a single atomic write or a consistent read.
pub trait Store: Send + Sync + 'static {
    // -- Users (external, read-only for the core) --

    /// Seeding hook for the profile subsystem.
    fn upsert_user(&self, profile: &UserProfile) -> Result<()>;

    fn get_user(&self, username: &str) -> Result<Option<UserProfile>>;

    // -- Blocks (external, read-only for the core) --

    /// Seeding hook for the profile subsystem.
    fn set_block(&self, blocker: &str, blocked: &str, active: bool) -> Result<()>;

    fn is_blocked(&self, blocker: &str, blocked: &str) -> Result<bool>;

    // -- Chats --

    /// Insert `candidate` unless a chat for the same member pair exists, then
    /// return whichever record holds the pair.
    fn insert_or_fetch_chat(&self, candidate: &Chat) -> Result<Chat>;

    fn find_chat_by_pair(&self, a: &str, b: &str) -> Result<Option<Chat>>;

    fn get_chat(&self, id: Uuid) -> Result<Option<Chat>>;

    fn set_chat_allow_message(&self, id: Uuid, allow: bool) -> Result<()>;

    fn touch_chat(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Chats the user participates in, newest-updated first.
    fn chats_for_user(&self, username: &str) -> Result<Vec<Chat>>;

    // -- Messages --

    fn insert_message(&self, message: &Message) -> Result<()>;

    /// Chronological ascending, at most the `limit` most recent.
    fn messages_for_chat(&self, chat_id: Uuid, limit: u32) -> Result<Vec<Message>>;

    // -- Notifications --

    fn insert_notification(&self, notification: &Notification) -> Result<()>;

    fn get_notification(&self, id: Uuid) -> Result<Option<Notification>>;

    fn notification_view(&self, id: Uuid) -> Result<Option<NotificationView>>;

    /// Newest first, joined with sender display data.
    fn notifications_for(&self, receiver: &str) -> Result<Vec<NotificationView>>;

    fn unread_notification_ids(&self, receiver: &str) -> Result<Vec<Uuid>>;

    fn mark_notification_read(&self, id: Uuid) -> Result<ReadTransition>;

    // -- Activities --

    fn insert_activity(&self, activity: &Activity) -> Result<()>;

    /// Newest first; ties broken by insertion order.
    fn activities_for(&self, user_id: &str) -> Result<Vec<Activity>>;

    /// Deletes every listed record in one statement. Returns rows removed.
    fn delete_activities(&self, ids: &[Uuid]) -> Result<usize>;
}
