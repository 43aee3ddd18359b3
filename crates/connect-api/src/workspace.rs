use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use connect_db::models::{ChannelRow, TeamRow};
use connect_types::api::{CreateChannelRequest, CreateTeamRequest};
use connect_types::models::{Channel, Team};

use crate::AppState;
use crate::error::ApiError;
use crate::messages::{parse_timestamp, parse_uuid};

/// Create a team. Every team starts with exactly one public "general"
/// channel — the store inserts both in one transaction.
pub async fn create_team(
    State(state): State<AppState>,
    Json(req): Json<CreateTeamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("team name is required"));
    }

    let team_id = Uuid::new_v4();
    let general_id = Uuid::new_v4();
    let now = Utc::now();

    state
        .db
        .create_team(&team_id.to_string(), name, &general_id.to_string(), now)?;

    info!("Team '{}' created ({})", name, team_id);

    Ok((
        StatusCode::CREATED,
        Json(Team {
            id: team_id,
            name: name.to_string(),
            created_at: now,
        }),
    ))
}

pub async fn list_teams(State(state): State<AppState>) -> Result<Json<Vec<Team>>, ApiError> {
    let teams = state.db.list_teams()?.into_iter().map(team_from_row).collect();
    Ok(Json(teams))
}

pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
) -> Result<Json<Team>, ApiError> {
    let row = state
        .db
        .get_team(&team_id.to_string())?
        .ok_or_else(|| ApiError::not_found("team", team_id))?;
    Ok(Json(team_from_row(row)))
}

/// Create a channel within a team. Duplicate names are allowed — see
/// DESIGN.md for why that behavior is kept.
pub async fn create_channel(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .get_team(&team_id.to_string())?
        .ok_or_else(|| ApiError::not_found("team", team_id))?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("channel name is required"));
    }

    let channel_id = Uuid::new_v4();
    let now = Utc::now();

    state.db.create_channel(
        &channel_id.to_string(),
        &team_id.to_string(),
        name,
        req.is_private,
        now,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(Channel {
            id: channel_id,
            team_id,
            name: name.to_string(),
            is_private: req.is_private,
            created_at: now,
        }),
    ))
}

/// The team's ordered channel list, in creation order.
pub async fn list_channels(
    State(state): State<AppState>,
    Path(team_id): Path<Uuid>,
) -> Result<Json<Vec<Channel>>, ApiError> {
    state
        .db
        .get_team(&team_id.to_string())?
        .ok_or_else(|| ApiError::not_found("team", team_id))?;

    let channels = state
        .db
        .list_channels(&team_id.to_string())?
        .into_iter()
        .map(channel_from_row)
        .collect();
    Ok(Json(channels))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<Channel>, ApiError> {
    let row = state
        .db
        .get_channel(&channel_id.to_string())?
        .ok_or_else(|| ApiError::not_found("channel", channel_id))?;
    Ok(Json(channel_from_row(row)))
}

fn team_from_row(row: TeamRow) -> Team {
    Team {
        id: parse_uuid(&row.id, "team id"),
        created_at: parse_timestamp(&row.created_at, &row.id),
        name: row.name,
    }
}

pub(crate) fn channel_from_row(row: ChannelRow) -> Channel {
    Channel {
        id: parse_uuid(&row.id, "channel id"),
        team_id: parse_uuid(&row.team_id, "team_id"),
        created_at: parse_timestamp(&row.created_at, &row.id),
        name: row.name,
        is_private: row.is_private,
    }
}
