//! 请求提取器

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use bazaar_core::error::ChatError;

use crate::interface::http::error::ApiError;
use crate::interface::http::state::AppState;

/// 已认证的调用方；从 `Authorization: Bearer` 令牌解出用户 id
pub struct AuthUser(pub i64);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError(ChatError::Unauthorized))?;
        let user_id = state.tokens.verify_bearer(header_value)?;
        Ok(AuthUser(user_id))
    }
}
