use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use uuid::Uuid;

use connect_types::api::AddReactionRequest;
use connect_types::events::GatewayEvent;

use crate::AppState;
use crate::error::ApiError;

/// Add a user's reaction to a message. The shipped toggle never removes a
/// reaction — a repeat add from the same user is a no-op, which is also
/// what keeps the count equal to the reactor set size. See DESIGN.md for
/// why the removal path is deliberately absent.
pub async fn add_reaction(
    State(state): State<AppState>,
    Path((_channel_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AddReactionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.emoji.trim().is_empty() {
        return Err(ApiError::validation("emoji is required"));
    }

    state
        .db
        .get_message(&message_id.to_string())?
        .ok_or_else(|| ApiError::not_found("message", message_id))?;

    let reaction_id = Uuid::new_v4();
    let added = state.db.add_reaction(
        &reaction_id.to_string(),
        &message_id.to_string(),
        &req.user_id.to_string(),
        &req.emoji,
        Utc::now(),
    )?;

    if added {
        state.dispatcher.broadcast(GatewayEvent::ReactionAdd {
            message_id,
            user_id: req.user_id,
            emoji: req.emoji,
        });
    }

    Ok(Json(serde_json::json!({ "added": added })))
}
