//! 消息端点
//!
//! 拉取与轮询共享读取即确认语义：返回给接收方的消息随响应置为已读。

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::commands::{DeleteMessage, MarkMessageRead, PostMessage, PostVoiceMessage};
use crate::application::queries::{ConversationUnreadCount, FetchMessages, PollNewMessages};
use crate::interface::http::error::ApiResult;
use crate::interface::http::extract::AuthUser;
use crate::interface::http::handlers::{MessageView, message_views};
use crate::interface::http::state::AppState;

#[derive(Deserialize)]
pub struct ListMessagesParams {
    pub unread_only: Option<bool>,
}

/// `GET /api/conversations/:id/messages`
pub async fn list_messages_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<i64>,
    Query(params): Query<ListMessagesParams>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let messages = state
        .queries
        .fetch_messages(
            FetchMessages {
                conversation_id,
                viewer_id: user_id,
                unread_only: params.unread_only.unwrap_or(false),
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(message_views(&messages)))
}

#[derive(Deserialize)]
pub struct NewMessagesParams {
    pub last_message_id: Option<i64>,
}

/// `GET /api/conversations/:id/messages/new?last_message_id=N`
pub async fn new_messages_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<i64>,
    Query(params): Query<NewMessagesParams>,
) -> ApiResult<Json<Value>> {
    let result = state
        .queries
        .poll_new_messages(
            PollNewMessages {
                conversation_id,
                viewer_id: user_id,
                last_message_id: params.last_message_id,
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(json!({
        "messages": message_views(&result.messages),
        "is_typing": result.is_typing,
        "current_user_id": result.current_user_id,
    })))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// `POST /api/conversations/:id/messages`
pub async fn send_message_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageView>)> {
    let message = state
        .commands
        .post_message(
            PostMessage {
                conversation_id,
                sender_id: user_id,
                content: body.content,
            },
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(MessageView::from(&message))))
}

#[derive(Deserialize)]
pub struct VoiceParams {
    pub duration: i32,
}

/// `POST /api/conversations/:id/voice-message?duration=S`（二进制请求体）
pub async fn send_voice_message_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<i64>,
    Query(params): Query<VoiceParams>,
    payload: Bytes,
) -> ApiResult<(StatusCode, Json<MessageView>)> {
    let message = state
        .commands
        .post_voice_message(
            PostVoiceMessage {
                conversation_id,
                sender_id: user_id,
                payload: payload.to_vec(),
                duration_secs: params.duration,
            },
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(MessageView::from(&message))))
}

/// `POST /api/messages/:id/read` —— 对自己发送的消息是静默 no-op
pub async fn mark_message_read_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let updated = state
        .commands
        .mark_message_read(
            MarkMessageRead {
                message_id,
                viewer_id: user_id,
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

/// `DELETE /api/messages/:id` —— 发送者本人软删除
pub async fn delete_message_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .commands
        .delete_message(DeleteMessage {
            message_id,
            requester_id: user_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/conversations/:id/unread-count`
pub async fn conversation_unread_count_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let unread_count = state
        .queries
        .conversation_unread_count(ConversationUnreadCount {
            conversation_id,
            viewer_id: user_id,
        })
        .await?;
    Ok(Json(json!({ "unread_count": unread_count })))
}

/// `GET /api/chat/unread-count` —— 全局未读徽标轮询
pub async fn global_unread_count_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<Value>> {
    let unread_count = state.queries.global_unread_count(user_id).await?;
    Ok(Json(json!({ "unread_count": unread_count })))
}
