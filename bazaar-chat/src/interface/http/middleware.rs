//! 请求级中间件
//!
//! 每个带有效凭证的请求都会先经过一次心跳触达，再进入业务处理。
//! 触达失败绝不阻塞底下的请求。

use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use bazaar_core::metrics::METRICS;

use crate::domain::model::PresenceAction;
use crate::interface::http::state::AppState;

pub async fn track_presence(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    if let Some(user_id) = bearer_user(&state, request.headers()) {
        state
            .presence
            .touch_best_effort(user_id, PresenceAction::Heartbeat, Utc::now())
            .await;
    }

    let response = next.run(request).await;

    METRICS
        .http_request_duration_seconds
        .observe(started.elapsed().as_secs_f64());
    response
}

/// 静默解析调用方；无凭证或凭证无效都返回 None，留给业务提取器拒绝
fn bearer_user(state: &AppState, headers: &HeaderMap) -> Option<i64> {
    let header_value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    state.tokens.verify_bearer(header_value).ok()
}
