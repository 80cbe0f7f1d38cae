//! 会话端点

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::commands::{MarkConversationRead, NotifyTyping, OpenConversation};
use crate::interface::http::error::ApiResult;
use crate::interface::http::extract::AuthUser;
use crate::interface::http::state::AppState;

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    pub peer_user_id: i64,
}

/// `POST /api/conversations` —— 无序对去重，重复调用幂等
pub async fn create_conversation_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateConversationRequest>,
) -> ApiResult<Json<Value>> {
    let (conversation, is_new) = state
        .commands
        .open_conversation(
            OpenConversation {
                initiator_id: user_id,
                peer_user_id: body.peer_user_id,
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(json!({
        "conversation_id": conversation.id,
        "is_new": is_new,
    })))
}

/// `POST /api/conversations/:id/read` —— 批量置为已读
pub async fn mark_conversation_read_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let updated = state
        .commands
        .mark_conversation_read(
            MarkConversationRead {
                conversation_id,
                viewer_id: user_id,
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

/// `POST /api/conversations/:id/typing` —— 正在输入通知（尽力而为）
pub async fn typing_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .commands
        .notify_typing(NotifyTyping {
            conversation_id,
            user_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
