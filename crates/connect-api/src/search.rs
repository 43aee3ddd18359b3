use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;

use connect_types::api::{FileHit, KindFilter, SearchQuery, SearchResponse};

use crate::AppState;
use crate::error::ApiError;
use crate::messages::{attachment_kind, hydrate_messages, parse_timestamp, parse_uuid};
use crate::workspace::channel_from_row;

/// Filtered search over messages and attachments. Read-through over the
/// store — nothing is indexed separately. All filters are conjunctive and
/// results come back newest first.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let range = connect_db::search::date_range(query.date, Utc::now());
    let from = query.from.map(|id| id.to_string());
    let channel = query.channel.map(|id| id.to_string());

    let db = state.clone();
    let needle = query.query.trim().to_string();
    let kind = query.kind;

    let (messages, files, channels) = tokio::task::spawn_blocking(move || {
        let messages = if matches!(kind, KindFilter::All | KindFilter::Messages) {
            let rows =
                db.db
                    .search_messages(&needle, from.as_deref(), channel.as_deref(), range)?;
            hydrate_messages(&db.db, rows)?
        } else {
            vec![]
        };

        let files = if matches!(kind, KindFilter::All | KindFilter::Files) {
            db.db
                .search_files(&needle, from.as_deref(), channel.as_deref(), range)?
                .into_iter()
                .map(|row| FileHit {
                    message_id: parse_uuid(&row.message_id, "message id"),
                    channel_id: parse_uuid(&row.channel_id, "channel_id"),
                    author_id: parse_uuid(&row.author_id, "author_id"),
                    kind: attachment_kind(&row.kind),
                    created_at: parse_timestamp(&row.created_at, &row.message_id),
                    url: row.url,
                    name: row.name,
                })
                .collect()
        } else {
            vec![]
        };

        let channels = if matches!(kind, KindFilter::All | KindFilter::Channels) {
            db.db
                .search_channels(&needle)?
                .into_iter()
                .map(channel_from_row)
                .collect()
        } else {
            vec![]
        };

        Ok::<_, anyhow::Error>((messages, files, channels))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(SearchResponse { messages, files, channels }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppStateInner, DeliveryLocks};
    use crate::threads::ThreadSessions;
    use connect_db::Database;
    use connect_gateway::dispatcher::Dispatcher;
    use connect_types::api::DateFilter;
    use connect_types::models::{Attachment, AttachmentKind};
    use std::sync::Arc;
    use uuid::Uuid;

    fn fixture() -> (AppState, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let team_id = Uuid::new_v4();
        let general = Uuid::new_v4();
        db.create_team(&team_id.to_string(), "Factory", &general.to_string(), Utc::now())
            .unwrap();

        let design = Uuid::new_v4();
        db.create_channel(
            &design.to_string(),
            &team_id.to_string(),
            "design-channel",
            false,
            Utc::now(),
        )
        .unwrap();

        let author = Uuid::new_v4();
        let post = |channel: &Uuid, content: &str| {
            db.insert_message(
                &Uuid::new_v4().to_string(),
                &channel.to_string(),
                &author.to_string(),
                content,
                &[],
                Utc::now(),
            )
            .unwrap();
        };

        // 2 in design-channel, 1 elsewhere, only 1 containing "design"
        post(&design, "the design tokens moved");
        post(&design, "standup at ten");
        post(&general, "lunch?");

        let state = Arc::new(AppStateInner {
            db,
            dispatcher: Dispatcher::new(),
            threads: ThreadSessions::new(),
            delivery: DeliveryLocks::new(),
        });
        (state, design, author)
    }

    fn query(q: &str) -> SearchQuery {
        SearchQuery {
            query: q.into(),
            from: None,
            channel: None,
            date: DateFilter::Anytime,
            kind: KindFilter::All,
        }
    }

    #[tokio::test]
    async fn channel_filtered_query_returns_exactly_one_hit() {
        let (state, design, _) = fixture();
        let mut q = query("design");
        q.channel = Some(design);

        let Json(response) = search(State(state), Query(q)).await.unwrap();
        assert_eq!(response.messages.len(), 1);
        assert_eq!(response.messages[0].content, "the design tokens moved");
        assert!(response.files.is_empty());
        // kind=all also surfaces the matching channel name
        assert_eq!(response.channels.len(), 1);
        assert_eq!(response.channels[0].name, "design-channel");
    }

    #[tokio::test]
    async fn channels_kind_returns_only_channel_hits() {
        let (state, design, _) = fixture();
        let mut q = query("design");
        q.kind = KindFilter::Channels;

        let Json(response) = search(State(state), Query(q)).await.unwrap();
        assert!(response.messages.is_empty());
        assert!(response.files.is_empty());
        assert_eq!(response.channels.len(), 1);
        assert_eq!(response.channels[0].id, design);
    }

    #[tokio::test]
    async fn kind_filter_suppresses_the_other_index() {
        let (state, design, author) = fixture();
        state
            .db
            .insert_message(
                &Uuid::new_v4().to_string(),
                &design.to_string(),
                &author.to_string(),
                "",
                &[Attachment {
                    kind: AttachmentKind::File,
                    url: "https://cdn/design.pdf".into(),
                    name: "design brief.pdf".into(),
                }],
                Utc::now(),
            )
            .unwrap();

        let mut files_only = query("design");
        files_only.kind = KindFilter::Files;
        let Json(response) = search(State(state.clone()), Query(files_only))
            .await
            .unwrap();
        assert!(response.messages.is_empty());
        assert_eq!(response.files.len(), 1);
        assert_eq!(response.files[0].name, "design brief.pdf");

        let mut messages_only = query("design");
        messages_only.kind = KindFilter::Messages;
        let Json(response) = search(State(state), Query(messages_only)).await.unwrap();
        assert!(response.files.is_empty());
        assert_eq!(response.messages.len(), 1);
    }

    #[tokio::test]
    async fn no_match_is_empty_arrays_not_an_error() {
        let (state, _, _) = fixture();
        let Json(response) = search(State(state), Query(query("zxqv"))).await.unwrap();
        assert!(response.messages.is_empty());
        assert!(response.files.is_empty());
        assert!(response.channels.is_empty());
    }
}
