use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

/// Chat-facing identity. This is a projection of the CRM account record,
/// not the account itself — only what the messaging surface needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Derived from display_name at write time and cached.
    pub initials: String,
}

/// Up to two uppercase initials from a display name ("Ada Lovelace" -> "AL").
pub fn initials_of(display_name: &str) -> String {
    display_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(|c| c.to_uppercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
}

/// Owned by its message; the URL is an opaque handle into whatever blob
/// store the deployment uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<ReactionGroup>,
    pub reply_count: usize,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    /// Store append sequence. Display order follows seq, never wall-clock
    /// timestamps, so concurrent posts keep one agreed order.
    pub seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadReply {
    pub id: Uuid,
    pub root_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    Dnd,
    Offline,
}

/// Expiry options offered when setting a custom status. Converted to an
/// absolute instant at set time — "today" re-derived at read time would
/// flip meaning across midnight, so the deadline is captured immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiresIn {
    Minutes30,
    Hour1,
    Hours4,
    Today,
    Never,
}

impl ExpiresIn {
    pub fn deadline_from(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ExpiresIn::Minutes30 => Some(now + Duration::minutes(30)),
            ExpiresIn::Hour1 => Some(now + Duration::hours(1)),
            ExpiresIn::Hours4 => Some(now + Duration::hours(4)),
            // End of the current UTC day.
            ExpiresIn::Today => now
                .date_naive()
                .succ_opt()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
            ExpiresIn::Never => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomStatus {
    pub emoji: String,
    pub text: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CustomStatus {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    /// Already filtered for expiry — consumers never see a stale status.
    pub custom_status: Option<CustomStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initials_from_two_names() {
        assert_eq!(initials_of("Ada Lovelace"), "AL");
    }

    #[test]
    fn initials_from_single_name() {
        assert_eq!(initials_of("madison"), "M");
    }

    #[test]
    fn initials_caps_at_two_words() {
        assert_eq!(initials_of("Jean Claude Van Damme"), "JC");
    }

    #[test]
    fn initials_of_empty_name_is_empty() {
        assert_eq!(initials_of("   "), "");
    }

    #[test]
    fn expires_in_today_is_end_of_utc_day() {
        let now = "2026-03-14T09:26:53Z".parse::<DateTime<Utc>>().unwrap();
        let deadline = ExpiresIn::Today.deadline_from(now).unwrap();
        assert_eq!(deadline, "2026-03-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn expires_in_never_has_no_deadline() {
        assert!(ExpiresIn::Never.deadline_from(Utc::now()).is_none());
    }

    #[test]
    fn custom_status_expires_exactly_at_deadline() {
        let now = Utc::now();
        let status = CustomStatus {
            emoji: "🍜".into(),
            text: "Lunch".into(),
            expires_at: ExpiresIn::Minutes30.deadline_from(now),
        };
        assert!(!status.is_expired(now));
        assert!(!status.is_expired(now + Duration::minutes(29)));
        assert!(status.is_expired(now + Duration::minutes(30)));
        assert!(status.is_expired(now + Duration::hours(2)));
    }

    #[test]
    fn custom_status_without_deadline_never_expires() {
        let status = CustomStatus {
            emoji: "🏖".into(),
            text: "OOO".into(),
            expires_at: None,
        };
        assert!(!status.is_expired(Utc::now() + Duration::days(365)));
    }
}
