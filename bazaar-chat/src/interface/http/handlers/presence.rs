//! 在线状态端点

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use bazaar_core::error::ChatError;

use crate::application::commands::TouchPresence;
use crate::application::queries::UserStatuses;
use crate::domain::model::PresenceAction;
use crate::interface::http::error::{ApiError, ApiResult};
use crate::interface::http::extract::AuthUser;
use crate::interface::http::state::AppState;

#[derive(Deserialize)]
pub struct HeartbeatParams {
    pub action: Option<String>,
}

/// `POST /api/session/heartbeat?action={heartbeat|online|offline}`
pub async fn heartbeat_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<HeartbeatParams>,
) -> ApiResult<StatusCode> {
    let action = match params.action.as_deref() {
        None => PresenceAction::Heartbeat,
        Some(raw) => PresenceAction::from_str(raw).ok_or_else(|| {
            ApiError(ChatError::validation(
                "action must be one of heartbeat, online, offline",
            ))
        })?,
    };

    state
        .commands
        .touch_presence(TouchPresence { user_id, action }, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct StatusParams {
    pub ids: String,
}

/// `GET /api/users/status?ids=1,2,3`
pub async fn users_status_handler(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Query(params): Query<StatusParams>,
) -> ApiResult<Json<Value>> {
    let mut user_ids = Vec::new();
    for raw in params.ids.split(',').filter(|raw| !raw.trim().is_empty()) {
        let id = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ApiError(ChatError::validation("ids must be a comma separated list of integers")))?;
        user_ids.push(id);
    }

    let statuses = state
        .queries
        .user_statuses(UserStatuses { user_ids }, Utc::now())
        .await?;
    let users: Vec<Value> = statuses
        .iter()
        .map(|status| {
            json!({
                "id": status.user_id,
                "online": status.online,
                "last_seen_at": status.last_seen_at,
            })
        })
        .collect();
    Ok(Json(json!({ "users": users })))
}

/// `GET /api/users/online-count`
pub async fn online_count_handler(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let online_count = state.queries.online_count().await?;
    Ok(Json(json!({ "online_count": online_count })))
}
