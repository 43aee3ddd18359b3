/// Database row types — these map directly to SQLite rows.
/// Distinct from connect-types API models to keep the store layer
/// independent; id fields stay as TEXT until the API layer parses them.

pub struct TeamRow {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub is_private: bool,
    pub created_at: String,
}

pub struct UserRow {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub initials: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub is_pinned: bool,
    pub created_at: String,
}

pub struct ThreadReplyRow {
    pub seq: i64,
    pub id: String,
    pub root_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: String,
}

pub struct AttachmentRow {
    pub owner_id: String,
    pub kind: String,
    pub url: String,
    pub name: String,
}

pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}
