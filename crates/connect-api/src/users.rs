use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use connect_db::models::UserRow;
use connect_types::api::UpsertUserRequest;
use connect_types::models::{Presence, User, initials_of};

use crate::AppState;
use crate::error::ApiError;
use crate::messages::parse_uuid;

/// Register or refresh a chat identity. The id comes from the CRM side —
/// this surface only maintains the messaging projection of it. Initials
/// are derived here and cached with the record.
pub async fn upsert_user(
    State(state): State<AppState>,
    Json(req): Json<UpsertUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let display_name = req.display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::validation("display name is required"));
    }

    let initials = initials_of(display_name);
    state.db.upsert_user(
        &req.id.to_string(),
        display_name,
        req.avatar_url.as_deref(),
        &initials,
        Utc::now(),
    )?;

    Ok((
        StatusCode::OK,
        Json(User {
            id: req.id,
            display_name: display_name.to_string(),
            avatar_url: req.avatar_url,
            initials,
        }),
    ))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.db.list_users()?.into_iter().map(user_from_row).collect();
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let row = state
        .db
        .get_user(&user_id.to_string())?
        .ok_or_else(|| ApiError::not_found("user", user_id))?;
    Ok(Json(user_from_row(row)))
}

/// Presence snapshot over REST, for consumers that don't hold a gateway
/// connection. Custom-status expiry is applied inside the read.
pub async fn get_presence(State(state): State<AppState>) -> Json<Vec<Presence>> {
    Json(state.dispatcher.presence_snapshot())
}

pub async fn get_user_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<Presence> {
    Json(state.dispatcher.presence_of(user_id))
}

fn user_from_row(row: UserRow) -> User {
    User {
        id: parse_uuid(&row.id, "user id"),
        display_name: row.display_name,
        avatar_url: row.avatar_url,
        initials: row.initials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppStateInner, DeliveryLocks};
    use crate::threads::ThreadSessions;
    use connect_db::Database;
    use connect_gateway::dispatcher::Dispatcher;
    use connect_types::models::{ExpiresIn, PresenceStatus};
    use std::sync::Arc;

    fn empty_state() -> AppState {
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            dispatcher: Dispatcher::new(),
            threads: ThreadSessions::new(),
            delivery: DeliveryLocks::new(),
        })
    }

    #[tokio::test]
    async fn upsert_derives_and_caches_initials() {
        let state = empty_state();
        let id = Uuid::new_v4();

        upsert_user(
            State(state.clone()),
            Json(UpsertUserRequest {
                id,
                display_name: "  grace hopper ".into(),
                avatar_url: None,
            }),
        )
        .await
        .unwrap();

        let Json(user) = get_user(State(state), Path(id)).await.unwrap();
        assert_eq!(user.display_name, "grace hopper");
        assert_eq!(user.initials, "GH");
    }

    #[tokio::test]
    async fn blank_display_name_is_rejected() {
        let state = empty_state();
        let result = upsert_user(
            State(state),
            Json(UpsertUserRequest {
                id: Uuid::new_v4(),
                display_name: " ".into(),
                avatar_url: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn rest_presence_read_applies_expiry() {
        let state = empty_state();
        let user = Uuid::new_v4();
        state.dispatcher.set_status(user, PresenceStatus::Online);
        state
            .dispatcher
            .set_custom_status(user, "🎧".into(), "Focus".into(), ExpiresIn::Never);

        let Json(presence) = get_user_presence(State(state.clone()), Path(user)).await;
        assert_eq!(presence.status, PresenceStatus::Online);
        assert_eq!(presence.custom_status.unwrap().text, "Focus");

        state.dispatcher.clear_custom_status(user);
        let Json(presence) = get_user_presence(State(state), Path(user)).await;
        assert!(presence.custom_status.is_none());
    }
}
