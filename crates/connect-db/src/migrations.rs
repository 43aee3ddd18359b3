use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS teams (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        -- Channel names are NOT unique within a team. Matches the behavior
        -- the product currently ships with; see DESIGN.md.
        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            team_id     TEXT NOT NULL REFERENCES teams(id),
            name        TEXT NOT NULL,
            is_private  INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channels_team
            ON channels(team_id);

        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            display_name  TEXT NOT NULL,
            avatar_url    TEXT,
            initials      TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );

        -- seq is the append sequence: readers order by seq, never by
        -- created_at, so all readers agree on one relative order.
        CREATE TABLE IF NOT EXISTS messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            author_id   TEXT NOT NULL,
            content     TEXT NOT NULL,
            is_pinned   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, seq);

        -- Thread replies never appear in the channel log, so they live in
        -- their own table rather than as flagged rows in messages.
        CREATE TABLE IF NOT EXISTS thread_replies (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            root_id     TEXT NOT NULL REFERENCES messages(id),
            author_id   TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_thread_replies_root
            ON thread_replies(root_id, seq);

        -- owner_id is either a message id or a thread reply id.
        CREATE TABLE IF NOT EXISTS attachments (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id  TEXT NOT NULL,
            kind      TEXT NOT NULL CHECK (kind IN ('image', 'file')),
            url       TEXT NOT NULL,
            name      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_owner
            ON attachments(owner_id);

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
