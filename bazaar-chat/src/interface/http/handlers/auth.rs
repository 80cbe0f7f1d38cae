//! 登录 / 登出

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::commands::{Login, Logout};
use crate::interface::http::error::ApiResult;
use crate::interface::http::extract::AuthUser;
use crate::interface::http::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .commands
        .login(
            Login {
                username: body.username,
                password: body.password,
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(json!({
        "token": outcome.token,
        "user_id": outcome.user_id,
    })))
}

pub async fn logout_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<StatusCode> {
    state
        .commands
        .logout(Logout { user_id }, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
