use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            -- Owned by the profile subsystem; read-only for the core
            CREATE TABLE users (
                username        TEXT PRIMARY KEY,
                first_name      TEXT NOT NULL DEFAULT '',
                last_name       TEXT NOT NULL DEFAULT '',
                user_picture    TEXT
            );

            -- Owned by the profile subsystem; read-only for the core
            CREATE TABLE blocks (
                blocker     TEXT NOT NULL,
                blocked     TEXT NOT NULL,
                PRIMARY KEY (blocker, blocked)
            );

            CREATE TABLE chats (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                member_a        TEXT NOT NULL,
                member_b        TEXT NOT NULL,
                allow_message   INTEGER NOT NULL DEFAULT 1,
                updated_at      TEXT NOT NULL,
                CHECK (member_a < member_b),
                UNIQUE (member_a, member_b)
            );

            CREATE INDEX idx_chats_member_b ON chats(member_b);

            CREATE TABLE messages (
                seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
                id                  TEXT NOT NULL UNIQUE,
                chat_id             TEXT NOT NULL REFERENCES chats(id),
                sender_username     TEXT NOT NULL,
                text                TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);

            CREATE TABLE notifications (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                sender          TEXT NOT NULL,
                receiver        TEXT NOT NULL,
                action_type     TEXT NOT NULL,
                post_id         TEXT,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_receiver ON notifications(receiver, created_at);

            CREATE TABLE activities (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                user_id         TEXT NOT NULL,
                kind            TEXT NOT NULL,
                target          TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_activities_user ON activities(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
