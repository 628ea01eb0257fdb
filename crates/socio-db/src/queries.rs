use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use socio_types::models::{
    Activity, Chat, Message, Notification, NotificationView, UserProfile, member_pair,
};

use crate::Database;
use crate::models::{
    ActivityRow, ChatRow, MessageRow, NotificationRow, NotificationViewRow, format_ts,
};
use crate::store::{ReadTransition, Store};

const CHAT_COLUMNS: &str = "id, member_a, member_b, allow_message, updated_at";
const NOTIFICATION_COLUMNS: &str =
    "n.id, n.sender, n.receiver, n.action_type, n.post_id, n.is_read, n.created_at";

impl Store for Database {
    // -- Users --

    fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, first_name, last_name, user_picture) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(username) DO UPDATE SET
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    user_picture = excluded.user_picture",
                rusqlite::params![
                    profile.username,
                    profile.first_name,
                    profile.last_name,
                    profile.user_picture
                ],
            )?;
            Ok(())
        })
    }

    fn get_user(&self, username: &str) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT username, first_name, last_name, user_picture FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(UserProfile {
                        username: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        user_picture: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Blocks --

    fn set_block(&self, blocker: &str, blocked: &str, active: bool) -> Result<()> {
        self.with_conn(|conn| {
            if active {
                conn.execute(
                    "INSERT OR IGNORE INTO blocks (blocker, blocked) VALUES (?1, ?2)",
                    (blocker, blocked),
                )?;
            } else {
                conn.execute(
                    "DELETE FROM blocks WHERE blocker = ?1 AND blocked = ?2",
                    (blocker, blocked),
                )?;
            }
            Ok(())
        })
    }

    fn is_blocked(&self, blocker: &str, blocked: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM blocks WHERE blocker = ?1 AND blocked = ?2",
                    (blocker, blocked),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Chats --

    fn insert_or_fetch_chat(&self, candidate: &Chat) -> Result<Chat> {
        let (a, b) = member_pair(&candidate.members[0], &candidate.members[1]);

        // The writer lock plus UNIQUE(member_a, member_b) make this insert-or-fetch atomic.
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chats (id, member_a, member_b, allow_message, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    candidate.id.to_string(),
                    a,
                    b,
                    candidate.allow_message,
                    format_ts(candidate.updated_at)
                ],
            )?;

            query_chat_by_pair(conn, a, b)?
                .ok_or_else(|| anyhow!("Chat for pair ({}, {}) missing after insert", a, b))
        })
    }

    fn find_chat_by_pair(&self, a: &str, b: &str) -> Result<Option<Chat>> {
        let (a, b) = member_pair(a, b);
        self.with_conn(|conn| query_chat_by_pair(conn, a, b))
    }

    fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM chats WHERE id = ?1", CHAT_COLUMNS);
            let row = conn.query_row(&sql, [id.to_string()], chat_row).optional()?;
            row.map(Chat::try_from).transpose()
        })
    }

    fn set_chat_allow_message(&self, id: Uuid, allow: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chats SET allow_message = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), allow],
            )?;
            Ok(())
        })
    }

    fn touch_chat(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chats SET updated_at = ?2 WHERE id = ?1",
                (id.to_string(), format_ts(at)),
            )?;
            Ok(())
        })
    }

    fn chats_for_user(&self, username: &str) -> Result<Vec<Chat>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM chats
                 WHERE member_a = ?1 OR member_b = ?1
                 ORDER BY updated_at DESC, seq DESC",
                CHAT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([username], chat_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(Chat::try_from).collect()
        })
    }

    // -- Messages --

    fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_username, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    message.id.to_string(),
                    message.chat_id.to_string(),
                    message.sender_username,
                    message.text,
                    format_ts(message.created_at)
                ],
            )?;
            Ok(())
        })
    }

    fn messages_for_chat(&self, chat_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            // Take the newest `limit`, then flip back to chronological order
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_username, text, created_at FROM (
                    SELECT seq, id, chat_id, sender_username, text, created_at
                    FROM messages
                    WHERE chat_id = ?1
                    ORDER BY created_at DESC, seq DESC
                    LIMIT ?2
                 )
                 ORDER BY created_at ASC, seq ASC",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![chat_id.to_string(), limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        sender_username: row.get(2)?,
                        text: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(Message::try_from).collect()
        })
    }

    // -- Notifications --

    fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, sender, receiver, action_type, post_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    notification.id.to_string(),
                    notification.sender,
                    notification.receiver,
                    notification.action_type.as_str(),
                    notification.post_id,
                    notification.is_read,
                    format_ts(notification.created_at)
                ],
            )?;
            Ok(())
        })
    }

    fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM notifications n WHERE n.id = ?1", NOTIFICATION_COLUMNS);
            let row = conn
                .query_row(&sql, [id.to_string()], notification_row)
                .optional()?;
            row.map(Notification::try_from).transpose()
        })
    }

    fn notification_view(&self, id: Uuid) -> Result<Option<NotificationView>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, u.first_name, u.last_name, u.user_picture
                 FROM notifications n
                 LEFT JOIN users u ON u.username = n.sender
                 WHERE n.id = ?1",
                NOTIFICATION_COLUMNS
            );
            let row = conn
                .query_row(&sql, [id.to_string()], notification_view_row)
                .optional()?;
            row.map(NotificationView::try_from).transpose()
        })
    }

    fn notifications_for(&self, receiver: &str) -> Result<Vec<NotificationView>> {
        // JOIN users to fetch sender display data in a single query (no N+1)
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, u.first_name, u.last_name, u.user_picture
                 FROM notifications n
                 LEFT JOIN users u ON u.username = n.sender
                 WHERE n.receiver = ?1
                 ORDER BY n.created_at DESC, n.seq DESC",
                NOTIFICATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([receiver], notification_view_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(NotificationView::try_from).collect()
        })
    }

    fn unread_notification_ids(&self, receiver: &str) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM notifications WHERE receiver = ?1 AND is_read = 0 ORDER BY seq",
            )?;
            let ids = stmt
                .query_map([receiver], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            ids.iter()
                .map(|id| id.parse::<Uuid>().map_err(|e| anyhow!("Corrupt notification id '{}': {}", id, e)))
                .collect()
        })
    }

    fn mark_notification_read(&self, id: Uuid) -> Result<ReadTransition> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                [id.to_string()],
            )?;
            if changed > 0 {
                return Ok(ReadTransition::Marked);
            }

            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM notifications WHERE id = ?1", [id.to_string()], |row| {
                    row.get(0)
                })
                .optional()?;

            Ok(if exists.is_some() {
                ReadTransition::AlreadyRead
            } else {
                ReadTransition::NotFound
            })
        })
    }

    // -- Activities --

    fn insert_activity(&self, activity: &Activity) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO activities (id, user_id, kind, target, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    activity.id.to_string(),
                    activity.user_id,
                    activity.kind.as_str(),
                    activity.target,
                    format_ts(activity.created_at)
                ],
            )?;
            Ok(())
        })
    }

    fn activities_for(&self, user_id: &str) -> Result<Vec<Activity>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, target, created_at FROM activities
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, seq DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ActivityRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        target: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(Activity::try_from).collect()
        })
    }

    fn delete_activities(&self, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "DELETE FROM activities WHERE id IN ({})",
                placeholders.join(", ")
            );

            let id_strings: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            let params: Vec<&dyn rusqlite::types::ToSql> = id_strings
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            Ok(conn.execute(&sql, params.as_slice())?)
        })
    }
}

fn query_chat_by_pair(conn: &Connection, a: &str, b: &str) -> Result<Option<Chat>> {
    let sql = format!(
        "SELECT {} FROM chats WHERE member_a = ?1 AND member_b = ?2",
        CHAT_COLUMNS
    );
    let row = conn.query_row(&sql, (a, b), chat_row).optional()?;
    row.map(Chat::try_from).transpose()
}

fn chat_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        member_a: row.get(1)?,
        member_b: row.get(2)?,
        allow_message: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn notification_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        sender: row.get(1)?,
        receiver: row.get(2)?,
        action_type: row.get(3)?,
        post_id: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn notification_view_row(row: &Row<'_>) -> rusqlite::Result<NotificationViewRow> {
    Ok(NotificationViewRow {
        notification: notification_row(row)?,
        first_name: row.get(7)?,
        last_name: row.get(8)?,
        user_picture: row.get(9)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
