use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use connect_db::Database;
use connect_db::models::{AttachmentRow, MessageRow};
use connect_types::api::{MessageResponse, PinMessageRequest, SendMessageRequest};
use connect_types::events::GatewayEvent;
use connect_types::models::{Attachment, AttachmentKind, Message, ReactionGroup};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the seq of the oldest message from
    /// the previous page to fetch older messages.
    pub before: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

enum AppendOutcome {
    ChannelMissing,
    EmptyInput,
    Committed(i64),
}

/// The delivery pipeline: validate, commit to the store, broadcast, return
/// the committed message. The caller's optimistic copy reconciles on the
/// echoed client_key; a Delivery error means nothing was committed and the
/// same key can be resent.
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    let message_id = Uuid::new_v4();
    let now = Utc::now();

    // Held from commit through broadcast so subscribers see append order
    let lock = state.delivery.for_key(channel_id);
    let _guard = lock.lock().await;

    // Run the blocking store work off the async runtime
    let db = state.clone();
    let author_id = req.author_id;
    let content = req.content.clone();
    let attachments = req.attachments.clone();
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<AppendOutcome> {
        if db.db.get_channel(&channel_id.to_string())?.is_none() {
            return Ok(AppendOutcome::ChannelMissing);
        }
        // Empty input with nothing attached is dropped, not failed
        if content.trim().is_empty() && attachments.is_empty() {
            return Ok(AppendOutcome::EmptyInput);
        }
        let seq = db.db.insert_message(
            &message_id.to_string(),
            &channel_id.to_string(),
            &author_id.to_string(),
            &content,
            &attachments,
            now,
        )?;
        Ok(AppendOutcome::Committed(seq))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
    .map_err(|e| ApiError::delivery(format!("message append failed: {}", e)))?;

    let seq = match outcome {
        AppendOutcome::ChannelMissing => {
            return Err(ApiError::not_found("channel", channel_id));
        }
        AppendOutcome::EmptyInput => return Ok(StatusCode::NO_CONTENT.into_response()),
        AppendOutcome::Committed(seq) => seq,
    };

    let message = Message {
        id: message_id,
        channel_id,
        author_id: req.author_id,
        content: req.content,
        attachments: req.attachments,
        reactions: vec![],
        reply_count: 0,
        is_pinned: false,
        created_at: now,
        seq,
    };

    // Still under the delivery lock: commit then broadcast
    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        message: message.clone(),
        client_key: req.client_key.clone(),
    });

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message,
            client_key: req.client_key,
        }),
    )
        .into_response())
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let db = state.clone();
    let limit = query.limit.min(200);
    let before = query.before;

    let messages = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Vec<Message>>> {
        if db.db.get_channel(&channel_id.to_string())?.is_none() {
            return Ok(None);
        }
        let rows = db.db.get_messages(&channel_id.to_string(), limit, before)?;
        Ok(Some(hydrate_messages(&db.db, rows)?))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??
    .ok_or_else(|| ApiError::not_found("channel", channel_id))?;

    Ok(Json(messages))
}

pub async fn pin_message(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<PinMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let found = state.db.set_pinned(&message_id.to_string(), req.pinned)?;
    if !found {
        return Err(ApiError::not_found("message", message_id));
    }

    state.dispatcher.broadcast(GatewayEvent::MessagePinned {
        channel_id,
        message_id,
        pinned: req.pinned,
    });

    Ok(Json(serde_json::json!({ "pinned": req.pinned })))
}

/// Join stored rows with their attachments, reactions, and reply counts.
/// Reaction groups are built from the reactor set, so count == set size by
/// construction. Shared with the search surface.
pub fn hydrate_messages(db: &Database, rows: Vec<MessageRow>) -> anyhow::Result<Vec<Message>> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

    let attachment_rows = db.attachments_for(&ids)?;
    let reaction_rows = db.reactions_for_messages(&ids)?;
    let reply_counts: HashMap<String, usize> =
        db.reply_counts_for(&ids)?.into_iter().collect();

    let mut attachment_map: HashMap<String, Vec<Attachment>> = HashMap::new();
    for row in attachment_rows {
        let owner = row.owner_id.clone();
        attachment_map.entry(owner).or_default().push(attachment_from_row(row));
    }

    // message_id -> emoji -> user_ids
    let mut reaction_map: HashMap<String, HashMap<String, Vec<Uuid>>> = HashMap::new();
    for r in &reaction_rows {
        let emoji_map = reaction_map.entry(r.message_id.clone()).or_default();
        let user_ids = emoji_map.entry(r.emoji.clone()).or_default();
        if let Ok(uid) = r.user_id.parse::<Uuid>() {
            user_ids.push(uid);
        }
    }

    let messages = rows
        .into_iter()
        .map(|row| {
            let reactions = reaction_map
                .get(&row.id)
                .map(|emoji_map| {
                    emoji_map
                        .iter()
                        .map(|(emoji, user_ids)| ReactionGroup {
                            emoji: emoji.clone(),
                            count: user_ids.len(),
                            user_ids: user_ids.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            Message {
                id: parse_uuid(&row.id, "message id"),
                channel_id: parse_uuid(&row.channel_id, "channel_id"),
                author_id: parse_uuid(&row.author_id, "author_id"),
                attachments: attachment_map.remove(&row.id).unwrap_or_default(),
                reactions,
                reply_count: reply_counts.get(&row.id).copied().unwrap_or(0),
                is_pinned: row.is_pinned,
                created_at: parse_timestamp(&row.created_at, &row.id),
                content: row.content,
                seq: row.seq,
            }
        })
        .collect();

    Ok(messages)
}

pub(crate) fn attachment_from_row(row: AttachmentRow) -> Attachment {
    Attachment {
        kind: attachment_kind(&row.kind),
        url: row.url,
        name: row.name,
    }
}

pub(crate) fn attachment_kind(raw: &str) -> AttachmentKind {
    match raw {
        "image" => AttachmentKind::Image,
        "file" => AttachmentKind::File,
        other => {
            warn!("Unknown attachment kind '{}', treating as file", other);
            AttachmentKind::File
        }
    }
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(raw: &str, owner: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt created_at '{}' on '{}': {}", raw, owner, e);
        DateTime::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::ThreadSessions;
    use crate::{AppStateInner, DeliveryLocks};
    use connect_gateway::dispatcher::Dispatcher;
    use std::sync::Arc;

    fn state_with_channel() -> (AppState, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let team_id = Uuid::new_v4();
        let channel_id = Uuid::new_v4();
        db.create_team(
            &team_id.to_string(),
            "Factory",
            &channel_id.to_string(),
            Utc::now(),
        )
        .unwrap();

        let state = Arc::new(AppStateInner {
            db,
            dispatcher: Dispatcher::new(),
            threads: ThreadSessions::new(),
            delivery: DeliveryLocks::new(),
        });
        (state, channel_id)
    }

    fn request(author: Uuid, content: &str, attachments: Vec<Attachment>) -> SendMessageRequest {
        SendMessageRequest {
            author_id: author,
            content: content.into(),
            attachments,
            client_key: None,
        }
    }

    #[tokio::test]
    async fn whitespace_only_post_is_a_no_op() {
        let (state, channel_id) = state_with_channel();
        let author = Uuid::new_v4();

        let response = send_message(
            State(state.clone()),
            Path(channel_id),
            Json(request(author, "   \n\t ", vec![])),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let log = state
            .db
            .get_messages(&channel_id.to_string(), 50, None)
            .unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn empty_content_with_attachment_appends_one_message() {
        let (state, channel_id) = state_with_channel();
        let author = Uuid::new_v4();
        let attachment = Attachment {
            kind: AttachmentKind::Image,
            url: "https://cdn/pic.png".into(),
            name: "pic.png".into(),
        };

        let response = send_message(
            State(state.clone()),
            Path(channel_id),
            Json(request(author, "", vec![attachment])),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let log = state
            .db
            .get_messages(&channel_id.to_string(), 50, None)
            .unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn post_to_unknown_channel_is_not_found() {
        let (state, _) = state_with_channel();

        let result = send_message(
            State(state),
            Path(Uuid::new_v4()),
            Json(request(Uuid::new_v4(), "hello", vec![])),
        )
        .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn committed_message_is_broadcast_with_client_key() {
        let (state, channel_id) = state_with_channel();
        let mut rx = state.dispatcher.subscribe();

        let mut req = request(Uuid::new_v4(), "hello", vec![]);
        req.client_key = Some("local-42".into());

        send_message(State(state.clone()), Path(channel_id), Json(req))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            GatewayEvent::MessageCreate { message, client_key } => {
                assert_eq!(message.content, "hello");
                assert_eq!(message.channel_id, channel_id);
                assert_eq!(client_key.as_deref(), Some("local-42"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn history_hydrates_reactions_with_matching_counts() {
        let (state, channel_id) = state_with_channel();
        let author = Uuid::new_v4();

        send_message(
            State(state.clone()),
            Path(channel_id),
            Json(request(author, "react here", vec![])),
        )
        .await
        .unwrap();

        let row = &state
            .db
            .get_messages(&channel_id.to_string(), 1, None)
            .unwrap()[0];
        for user in [Uuid::new_v4(), Uuid::new_v4()] {
            state
                .db
                .add_reaction(
                    &Uuid::new_v4().to_string(),
                    &row.id,
                    &user.to_string(),
                    "👍",
                    Utc::now(),
                )
                .unwrap();
        }

        let Json(messages) = get_messages(
            State(state),
            Path(channel_id),
            Query(MessageQuery { limit: 50, before: None }),
        )
        .await
        .unwrap();

        assert_eq!(messages.len(), 1);
        let reaction = &messages[0].reactions[0];
        assert_eq!(reaction.emoji, "👍");
        assert_eq!(reaction.count, reaction.user_ids.len());
        assert_eq!(reaction.count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_posts_broadcast_in_append_order() {
        let (state, channel_id) = state_with_channel();
        let mut rx = state.dispatcher.subscribe();

        let mut handles = Vec::new();
        for i in 0..8 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                send_message(
                    State(state),
                    Path(channel_id),
                    Json(request(Uuid::new_v4(), &format!("post {}", i), vec![])),
                )
                .await
                .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut seqs = Vec::new();
        for _ in 0..8 {
            match rx.recv().await.unwrap() {
                GatewayEvent::MessageCreate { message, .. } => seqs.push(message.seq),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted, "broadcast order diverged from append order");
    }

    #[tokio::test]
    async fn pinning_unknown_message_is_not_found() {
        let (state, channel_id) = state_with_channel();

        let result = pin_message(
            State(state),
            Path((channel_id, Uuid::new_v4())),
            Json(PinMessageRequest { pinned: true }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
