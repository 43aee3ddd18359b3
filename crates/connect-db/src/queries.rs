use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use connect_types::models::{Attachment, AttachmentKind};

use crate::Database;
use crate::models::{
    AttachmentRow, ChannelRow, MessageRow, ReactionRow, TeamRow, ThreadReplyRow, UserRow,
};

impl Database {
    // -- Teams --

    /// Insert a team together with its default public "general" channel in
    /// one transaction — a team never exists without it.
    pub fn create_team(
        &self,
        id: &str,
        name: &str,
        general_channel_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let ts = now.to_rfc3339();
            tx.execute(
                "INSERT INTO teams (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![id, name, ts],
            )?;
            tx.execute(
                "INSERT INTO channels (id, team_id, name, is_private, created_at)
                 VALUES (?1, ?2, 'general', 0, ?3)",
                params![general_channel_id, id, ts],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_team(&self, id: &str) -> Result<Option<TeamRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare("SELECT id, name, created_at FROM teams WHERE id = ?1")?
                .query_row([id], team_from_row)
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_teams(&self) -> Result<Vec<TeamRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, created_at FROM teams ORDER BY created_at, id")?;
            let rows = stmt
                .query_map([], team_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Channels --

    pub fn create_channel(
        &self,
        id: &str,
        team_id: &str,
        name: &str,
        is_private: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, team_id, name, is_private, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, team_id, name, is_private, now.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, team_id, name, is_private, created_at
                     FROM channels WHERE id = ?1",
                )?
                .query_row([id], channel_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Channels in creation order — this is the team's ordered channel list.
    pub fn list_channels(&self, team_id: &str) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, team_id, name, is_private, created_at
                 FROM channels WHERE team_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([team_id], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Users --

    pub fn upsert_user(
        &self,
        id: &str,
        display_name: &str,
        avatar_url: Option<&str>,
        initials: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, display_name, avatar_url, initials, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     display_name = excluded.display_name,
                     avatar_url = excluded.avatar_url,
                     initials = excluded.initials",
                params![id, display_name, avatar_url, initials, now.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, display_name, avatar_url, initials, created_at
                     FROM users WHERE id = ?1",
                )?
                .query_row([id], user_from_row)
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, display_name, avatar_url, initials, created_at
                 FROM users ORDER BY display_name",
            )?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message (and its attachments) to a channel log in one
    /// transaction. Returns the assigned append sequence.
    pub fn insert_message(
        &self,
        id: &str,
        channel_id: &str,
        author_id: &str,
        content: &str,
        attachments: &[Attachment],
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, channel_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, channel_id, author_id, content, now.to_rfc3339()],
            )?;
            let seq = tx.last_insert_rowid();
            insert_attachments(&tx, id, attachments)?;
            tx.commit()?;
            Ok(seq)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT seq, id, channel_id, author_id, content, is_pinned, created_at
                     FROM messages WHERE id = ?1",
                )?
                .query_row([id], message_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Newest-first page of a channel log. `before_seq` is the cursor:
    /// pass the smallest seq from the previous page to fetch older rows.
    pub fn get_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before_seq: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, channel_id, author_id, content, is_pinned, created_at
                 FROM messages
                 WHERE channel_id = ?1 AND (?2 IS NULL OR seq < ?2)
                 ORDER BY seq DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![channel_id, before_seq, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if the message does not exist.
    pub fn set_pinned(&self, message_id: &str, pinned: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_pinned = ?2 WHERE id = ?1",
                params![message_id, pinned],
            )?;
            Ok(changed > 0)
        })
    }

    /// Batch-fetch attachments for a set of message or reply ids.
    pub fn attachments_for(&self, owner_ids: &[String]) -> Result<Vec<AttachmentRow>> {
        if owner_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=owner_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT owner_id, kind, url, name FROM attachments WHERE owner_id IN ({})
                 ORDER BY id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> = owner_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(bind.as_slice(), |row| {
                    Ok(AttachmentRow {
                        owner_id: row.get(0)?,
                        kind: row.get(1)?,
                        url: row.get(2)?,
                        name: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Reactions --

    /// Add a user's reaction to a message. Returns true if a row was
    /// inserted, false if the (emoji, user) pair was already present.
    ///
    /// There is deliberately no removal path: the shipped behavior only
    /// ever adds reactors, and this engine preserves it (see DESIGN.md).
    /// The UNIQUE constraint is what keeps count == |users| on repeat adds.
    pub fn add_reaction(
        &self,
        id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO reactions (id, message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, message_id, user_id, emoji, now.to_rfc3339()],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, user_id, emoji, created_at
                 FROM reactions WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(bind.as_slice(), |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        user_id: row.get(2)?,
                        emoji: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Threads --

    /// Append a reply to a root message's thread. Replies live outside the
    /// channel log table, so a reply can never surface as a top-level
    /// message.
    pub fn insert_thread_reply(
        &self,
        id: &str,
        root_id: &str,
        author_id: &str,
        content: &str,
        attachments: &[Attachment],
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO thread_replies (id, root_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, root_id, author_id, content, now.to_rfc3339()],
            )?;
            let seq = tx.last_insert_rowid();
            insert_attachments(&tx, id, attachments)?;
            tx.commit()?;
            Ok(seq)
        })
    }

    /// Replies in append order, oldest first.
    pub fn thread_replies(&self, root_id: &str) -> Result<Vec<ThreadReplyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, root_id, author_id, content, created_at
                 FROM thread_replies WHERE root_id = ?1 ORDER BY seq",
            )?;
            let rows = stmt
                .query_map([root_id], |row| {
                    Ok(ThreadReplyRow {
                        seq: row.get(0)?,
                        id: row.get(1)?,
                        root_id: row.get(2)?,
                        author_id: row.get(3)?,
                        content: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn reply_count(&self, root_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM thread_replies WHERE root_id = ?1",
                [root_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Batch reply counts keyed by root message id.
    pub fn reply_counts_for(&self, message_ids: &[String]) -> Result<Vec<(String, usize)>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT root_id, COUNT(*) FROM thread_replies
                 WHERE root_id IN ({}) GROUP BY root_id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(bind.as_slice(), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn insert_attachments(
    conn: &Connection,
    owner_id: &str,
    attachments: &[Attachment],
) -> Result<()> {
    for att in attachments {
        let kind = match att.kind {
            AttachmentKind::Image => "image",
            AttachmentKind::File => "file",
        };
        conn.execute(
            "INSERT INTO attachments (owner_id, kind, url, name) VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, kind, att.url, att.name],
        )?;
    }
    Ok(())
}

fn team_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeamRow> {
    Ok(TeamRow {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn channel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        team_id: row.get(1)?,
        name: row.get(2)?,
        is_private: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        display_name: row.get(1)?,
        avatar_url: row.get(2)?,
        initials: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        channel_id: row.get(2)?,
        author_id: row.get(3)?,
        content: row.get(4)?,
        is_pinned: row.get(5)?,
        created_at: row.get(6)?,
    })
}
