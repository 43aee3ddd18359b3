use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use rusqlite::params;

use connect_types::api::DateFilter;

use crate::Database;
use crate::models::MessageRow;

/// A file hit is an attachment plus the coordinates of its owning message.
pub struct FileHitRow {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub kind: String,
    pub url: String,
    pub name: String,
    pub created_at: String,
}

/// Half-open [start, end) UTC window for a date filter, or `None` for
/// anytime. Buckets are anchored to `now` so "today" means the caller's
/// current UTC day, not a stored notion of today.
pub fn date_range(
    filter: DateFilter,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start_of_day = now.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
    let end_of_day = start_of_day + Duration::days(1);

    match filter {
        DateFilter::Anytime => None,
        DateFilter::Today => Some((start_of_day, end_of_day)),
        DateFilter::Yesterday => Some((start_of_day - Duration::days(1), start_of_day)),
        DateFilter::ThisWeek => {
            let week_start = now
                .date_naive()
                .week(Weekday::Mon)
                .first_day()
                .and_hms_opt(0, 0, 0)?
                .and_utc();
            Some((week_start, end_of_day))
        }
        DateFilter::ThisMonth => {
            let month_start = now
                .date_naive()
                .with_day(1)?
                .and_hms_opt(0, 0, 0)?
                .and_utc();
            Some((month_start, end_of_day))
        }
    }
}

impl Database {
    /// Read-through message search: case-insensitive substring on content,
    /// conjunctive filters, newest first. An empty query matches everything
    /// the filters allow.
    pub fn search_messages(
        &self,
        query: &str,
        from: Option<&str>,
        channel: Option<&str>,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<MessageRow>> {
        let (start, end) = split_range(range);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, id, channel_id, author_id, content, is_pinned, created_at
                 FROM messages
                 WHERE (?1 = '' OR instr(lower(content), lower(?1)) > 0)
                   AND (?2 IS NULL OR author_id = ?2)
                   AND (?3 IS NULL OR channel_id = ?3)
                   AND (?4 IS NULL OR created_at >= ?4)
                   AND (?5 IS NULL OR created_at < ?5)
                 ORDER BY seq DESC",
            )?;
            let rows = stmt
                .query_map(params![query, from, channel, start, end], |row| {
                    Ok(MessageRow {
                        seq: row.get(0)?,
                        id: row.get(1)?,
                        channel_id: row.get(2)?,
                        author_id: row.get(3)?,
                        content: row.get(4)?,
                        is_pinned: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// File search: matches attachment display names, filtered by the
    /// owning message's author/channel/date.
    pub fn search_files(
        &self,
        query: &str,
        from: Option<&str>,
        channel: Option<&str>,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<FileHitRow>> {
        let (start, end) = split_range(range);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.channel_id, m.author_id, a.kind, a.url, a.name, m.created_at
                 FROM attachments a
                 JOIN messages m ON m.id = a.owner_id
                 WHERE (?1 = '' OR instr(lower(a.name), lower(?1)) > 0)
                   AND (?2 IS NULL OR m.author_id = ?2)
                   AND (?3 IS NULL OR m.channel_id = ?3)
                   AND (?4 IS NULL OR m.created_at >= ?4)
                   AND (?5 IS NULL OR m.created_at < ?5)
                 ORDER BY m.seq DESC",
            )?;
            let rows = stmt
                .query_map(params![query, from, channel, start, end], |row| {
                    Ok(FileHitRow {
                        message_id: row.get(0)?,
                        channel_id: row.get(1)?,
                        author_id: row.get(2)?,
                        kind: row.get(3)?,
                        url: row.get(4)?,
                        name: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

impl Database {
    /// Channel name search for the `channels` result type. Author and date
    /// filters don't apply to channels, so only the name matches here.
    pub fn search_channels(&self, query: &str) -> Result<Vec<crate::models::ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, team_id, name, is_private, created_at
                 FROM channels
                 WHERE (?1 = '' OR instr(lower(name), lower(?1)) > 0)
                 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([query], |row| {
                    Ok(crate::models::ChannelRow {
                        id: row.get(0)?,
                        team_id: row.get(1)?,
                        name: row.get(2)?,
                        is_private: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn split_range(
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> (Option<String>, Option<String>) {
    match range {
        Some((start, end)) => (Some(start.to_rfc3339()), Some(end.to_rfc3339())),
        None => (None, None),
    }
}
