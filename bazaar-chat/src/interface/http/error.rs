//! 业务错误到 HTTP 响应的映射
//!
//! 在线状态/活动统计失败不会走到这里（旁路已吞掉）；
//! 到达这里的错误都是请求主目的的失败，按分类映射状态码。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use bazaar_core::error::ChatError;

pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            ChatError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ChatError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ChatError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ChatError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "unauthorized" }),
            ),
            ChatError::AccountLocked { minutes_remaining } => (
                StatusCode::LOCKED,
                json!({
                    "error": self.0.to_string(),
                    "minutes_remaining": minutes_remaining,
                }),
            ),
            ChatError::Store(err) => {
                error!(error = %err, "storage failure surfaced to client");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
            ChatError::Internal(err) => {
                error!(error = %err, "internal failure surfaced to client");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
