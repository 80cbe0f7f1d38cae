//! Axum 路由构建

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::interface::http::handlers;
use crate::interface::http::middleware::track_presence;
use crate::interface::http::state::AppState;

/// 组装完整路由；所有路由共享在线状态触达中间件
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // 系统
        .route("/api/health", get(handlers::system::health_handler))
        .route("/metrics", get(handlers::system::metrics_handler))
        // 认证
        .route("/api/auth/login", post(handlers::auth::login_handler))
        .route("/api/auth/logout", post(handlers::auth::logout_handler))
        // 在线状态
        .route(
            "/api/session/heartbeat",
            post(handlers::presence::heartbeat_handler),
        )
        .route(
            "/api/users/status",
            get(handlers::presence::users_status_handler),
        )
        .route(
            "/api/users/online-count",
            get(handlers::presence::online_count_handler),
        )
        // 会话
        .route(
            "/api/conversations",
            post(handlers::conversations::create_conversation_handler),
        )
        .route(
            "/api/conversations/:id/read",
            post(handlers::conversations::mark_conversation_read_handler),
        )
        .route(
            "/api/conversations/:id/typing",
            post(handlers::conversations::typing_handler),
        )
        // 消息
        .route(
            "/api/conversations/:id/messages",
            get(handlers::messages::list_messages_handler)
                .post(handlers::messages::send_message_handler),
        )
        .route(
            "/api/conversations/:id/messages/new",
            get(handlers::messages::new_messages_handler),
        )
        .route(
            "/api/conversations/:id/voice-message",
            post(handlers::messages::send_voice_message_handler),
        )
        .route(
            "/api/conversations/:id/unread-count",
            get(handlers::messages::conversation_unread_count_handler),
        )
        .route(
            "/api/messages/:id/read",
            post(handlers::messages::mark_message_read_handler),
        )
        .route(
            "/api/messages/:id",
            axum::routing::delete(handlers::messages::delete_message_handler),
        )
        .route(
            "/api/chat/unread-count",
            get(handlers::messages::global_unread_count_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            track_presence,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
