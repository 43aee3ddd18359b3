use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CustomStatus, ExpiresIn, Message, PresenceStatus, ThreadReply};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is identified
    Ready { user_id: Uuid },

    /// A new message was committed to a channel log
    MessageCreate {
        message: Message,
        client_key: Option<String>,
    },

    /// A reply was appended to a message's thread
    ThreadReply {
        channel_id: Uuid,
        reply: ThreadReply,
        reply_count: usize,
    },

    /// A user reacted to a message
    ReactionAdd {
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },

    /// A message was pinned or unpinned
    MessagePinned {
        channel_id: Uuid,
        message_id: Uuid,
        pinned: bool,
    },

    /// A user started typing in a channel
    TypingStart { channel_id: Uuid, user_id: Uuid },

    /// A user's availability or custom status changed. Last write wins
    /// per user_id on the consumer side.
    PresenceUpdate {
        user_id: Uuid,
        status: PresenceStatus,
        custom_status: Option<CustomStatus>,
    },
}

impl GatewayEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Events that return `None` are global and go to every client.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message, .. } => Some(message.channel_id),
            Self::ThreadReply { channel_id, .. } => Some(*channel_id),
            Self::MessagePinned { channel_id, .. } => Some(*channel_id),
            Self::TypingStart { channel_id, .. } => Some(*channel_id),
            // Ready, ReactionAdd, PresenceUpdate are global
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Bind this connection to a user. Authentication happens upstream of
    /// the engine; the gateway trusts the identity it is handed.
    Identify { user_id: Uuid },

    /// Subscribe to events for specific channels. Channel-scoped events are
    /// only forwarded for subscribed channels.
    Subscribe { channel_ids: Vec<Uuid> },

    /// Indicate typing in a channel
    StartTyping { channel_id: Uuid },

    /// Set availability status
    SetStatus { status: PresenceStatus },

    /// Set a custom status with an expiry option
    SetCustomStatus {
        emoji: String,
        text: String,
        expires_in: ExpiresIn,
    },

    /// Remove any custom status
    ClearCustomStatus,
}
