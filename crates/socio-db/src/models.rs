//! Database row types. These map directly to SQLite rows.
//! Distinct from socio-types models to keep the DB layer independent.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use socio_types::models::{Activity, Chat, Message, Notification, NotificationView};

pub struct ChatRow {
    pub id: String,
    pub member_a: String,
    pub member_b: String,
    pub allow_message: bool,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_username: String,
    pub text: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub action_type: String,
    pub post_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// Notification joined with sender profile columns.
pub struct NotificationViewRow {
    pub notification: NotificationRow,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_picture: Option<String>,
}

pub struct ActivityRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub target: Option<String>,
    pub created_at: String,
}

/// Timestamps are written with millisecond precision so bursts stay ordered.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw).with_context(|| format!("Corrupt timestamp '{}'", raw))?;
    Ok(ts.with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("Corrupt id '{}'", raw))
}

impl TryFrom<ChatRow> for Chat {
    type Error = anyhow::Error;

    fn try_from(row: ChatRow) -> Result<Self> {
        Ok(Chat {
            id: parse_id(&row.id)?,
            members: [row.member_a, row.member_b],
            allow_message: row.allow_message,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_id(&row.id)?,
            chat_id: parse_id(&row.chat_id)?,
            sender_username: row.sender_username,
            text: row.text,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: parse_id(&row.id)?,
            sender: row.sender,
            receiver: row.receiver,
            action_type: row.action_type.parse()?,
            post_id: row.post_id,
            is_read: row.is_read,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

impl TryFrom<NotificationViewRow> for NotificationView {
    type Error = anyhow::Error;

    fn try_from(row: NotificationViewRow) -> Result<Self> {
        let n = Notification::try_from(row.notification)?;
        Ok(NotificationView {
            id: n.id,
            sender_username: n.sender,
            first_name: row.first_name.unwrap_or_default(),
            last_name: row.last_name.unwrap_or_default(),
            user_picture: row.user_picture,
            action_type: n.action_type,
            post_id: n.post_id,
            is_read: n.is_read,
            created_at: n.created_at,
        })
    }
}

impl TryFrom<ActivityRow> for Activity {
    type Error = anyhow::Error;

    fn try_from(row: ActivityRow) -> Result<Self> {
        Ok(Activity {
            id: parse_id(&row.id)?,
            user_id: row.user_id,
            kind: row.kind.parse()?,
            target: row.target,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}
