use std::collections::HashMap;
use std::sync::RwLock;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use connect_db::Database;
use connect_db::models::ThreadReplyRow;
use connect_types::api::{OpenThreadRequest, ThreadReplyRequest, ThreadResponse};
use connect_types::events::GatewayEvent;
use connect_types::models::{Message, ThreadReply};

use crate::AppState;
use crate::error::ApiError;
use crate::messages::{attachment_from_row, hydrate_messages, parse_timestamp, parse_uuid};

/// Per-user focused-thread state: Closed, or Open on exactly one root
/// message. Replying requires the matching thread to be open.
pub struct ThreadSessions {
    open: RwLock<HashMap<Uuid, Uuid>>,
}

impl ThreadSessions {
    pub fn new() -> Self {
        Self {
            open: RwLock::new(HashMap::new()),
        }
    }

    pub fn open(&self, user_id: Uuid, root_id: Uuid) {
        self.open
            .write()
            .expect("thread session lock poisoned")
            .insert(user_id, root_id);
    }

    pub fn close(&self, user_id: Uuid) {
        self.open
            .write()
            .expect("thread session lock poisoned")
            .remove(&user_id);
    }

    pub fn current(&self, user_id: Uuid) -> Option<Uuid> {
        self.open
            .read()
            .expect("thread session lock poisoned")
            .get(&user_id)
            .copied()
    }
}

impl Default for ThreadSessions {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the focused reply view on a root message. Opening a second thread
/// replaces the first — a user has at most one open.
pub async fn open_thread(
    State(state): State<AppState>,
    Path(root_id): Path<Uuid>,
    Json(req): Json<OpenThreadRequest>,
) -> Result<Json<ThreadResponse>, ApiError> {
    let thread = load_thread(&state.db, root_id)?;
    state.threads.open(req.user_id, root_id);
    Ok(Json(thread))
}

pub async fn close_thread(
    State(state): State<AppState>,
    Json(req): Json<OpenThreadRequest>,
) -> StatusCode {
    state.threads.close(req.user_id);
    StatusCode::NO_CONTENT
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(root_id): Path<Uuid>,
) -> Result<Json<ThreadResponse>, ApiError> {
    Ok(Json(load_thread(&state.db, root_id)?))
}

enum ReplyOutcome {
    RootMissing,
    EmptyInput,
    Committed {
        seq: i64,
        reply_count: usize,
        channel_id: String,
    },
}

/// Append a reply to the open thread. The reply goes into the thread list
/// only — it never becomes a top-level message in the channel log.
pub async fn reply_to_thread(
    State(state): State<AppState>,
    Path(root_id): Path<Uuid>,
    Json(req): Json<ThreadReplyRequest>,
) -> Result<Response, ApiError> {
    match state.threads.current(req.author_id) {
        Some(open_root) if open_root == root_id => {}
        _ => return Err(ApiError::not_found("open thread", root_id)),
    }

    let reply_id = Uuid::new_v4();
    let now = Utc::now();

    // Held from commit through broadcast so subscribers see replies in
    // append order for this thread
    let lock = state.delivery.for_key(root_id);
    let _guard = lock.lock().await;

    let db = state.clone();
    let author_id = req.author_id;
    let content = req.content.clone();
    let attachments = req.attachments.clone();
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<ReplyOutcome> {
        let Some(root) = db.db.get_message(&root_id.to_string())? else {
            return Ok(ReplyOutcome::RootMissing);
        };
        // Same rule as top-level posts: nothing to say, nothing appended
        if content.trim().is_empty() && attachments.is_empty() {
            return Ok(ReplyOutcome::EmptyInput);
        }
        let seq = db.db.insert_thread_reply(
            &reply_id.to_string(),
            &root_id.to_string(),
            &author_id.to_string(),
            &content,
            &attachments,
            now,
        )?;
        let reply_count = db.db.reply_count(&root_id.to_string())?;
        Ok(ReplyOutcome::Committed {
            seq,
            reply_count,
            channel_id: root.channel_id,
        })
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
    .map_err(|e| ApiError::delivery(format!("thread reply append failed: {}", e)))?;

    let (seq, reply_count, channel_id) = match outcome {
        ReplyOutcome::RootMissing => {
            return Err(ApiError::not_found("thread root", root_id));
        }
        ReplyOutcome::EmptyInput => return Ok(StatusCode::NO_CONTENT.into_response()),
        ReplyOutcome::Committed {
            seq,
            reply_count,
            channel_id,
        } => (seq, reply_count, channel_id),
    };

    let reply = ThreadReply {
        id: reply_id,
        root_id,
        author_id: req.author_id,
        content: req.content,
        attachments: req.attachments,
        created_at: now,
        seq,
    };

    // Still under the delivery lock: commit then broadcast
    state.dispatcher.broadcast(GatewayEvent::ThreadReply {
        channel_id: parse_uuid(&channel_id, "channel_id"),
        reply: reply.clone(),
        reply_count,
    });

    Ok((StatusCode::CREATED, Json(reply)).into_response())
}

fn load_thread(db: &Database, root_id: Uuid) -> Result<ThreadResponse, ApiError> {
    let root_row = db
        .get_message(&root_id.to_string())?
        .ok_or_else(|| ApiError::not_found("thread root", root_id))?;

    let root: Message = hydrate_messages(db, vec![root_row])?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("hydration dropped the root message"))?;

    let reply_rows = db.thread_replies(&root_id.to_string())?;
    let replies = hydrate_replies(db, reply_rows)?;

    Ok(ThreadResponse { root, replies })
}

fn hydrate_replies(
    db: &Database,
    rows: Vec<ThreadReplyRow>,
) -> anyhow::Result<Vec<ThreadReply>> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let mut attachment_map: HashMap<String, Vec<_>> = HashMap::new();
    for row in db.attachments_for(&ids)? {
        attachment_map
            .entry(row.owner_id.clone())
            .or_default()
            .push(attachment_from_row(row));
    }

    Ok(rows
        .into_iter()
        .map(|row| ThreadReply {
            id: parse_uuid(&row.id, "reply id"),
            root_id: parse_uuid(&row.root_id, "root_id"),
            author_id: parse_uuid(&row.author_id, "author_id"),
            attachments: attachment_map.remove(&row.id).unwrap_or_default(),
            created_at: parse_timestamp(&row.created_at, &row.id),
            content: row.content,
            seq: row.seq,
        })
        .collect())
}
