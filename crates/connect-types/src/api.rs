use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Attachment, AttachmentKind, Channel, Message, ThreadReply};

// -- Workspace --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTeamRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpsertUserRequest {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

// -- Messages --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub author_id: Uuid,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Opaque caller-chosen key echoed back so an optimistic local copy can
    /// be reconciled with the committed message. Also the retry handle
    /// after a delivery failure.
    pub client_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    #[serde(flatten)]
    pub message: Message,
    pub client_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinMessageRequest {
    pub pinned: bool,
}

// -- Threads --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenThreadRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadReplyRequest {
    pub author_id: Uuid,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub root: Message,
    pub replies: Vec<ThreadReply>,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddReactionRequest {
    pub user_id: Uuid,
    pub emoji: String,
}

// -- Search --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateFilter {
    #[default]
    Anytime,
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindFilter {
    #[default]
    All,
    Messages,
    Files,
    Channels,
}

/// All filters are conjunctive. `None` means "any" for the id filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub from: Option<Uuid>,
    pub channel: Option<Uuid>,
    #[serde(default)]
    pub date: DateFilter,
    #[serde(default)]
    pub kind: KindFilter,
}

#[derive(Debug, Serialize)]
pub struct FileHit {
    pub message_id: Uuid,
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub kind: AttachmentKind,
    pub url: String,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub messages: Vec<Message>,
    pub files: Vec<FileHit>,
    pub channels: Vec<Channel>,
}
