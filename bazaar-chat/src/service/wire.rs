//! Wire 风格的依赖注入模块
//!
//! 按依赖顺序构建仓储、领域服务与应用处理器。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use bazaar_core::config::AppConfig;

use crate::application::{ChatCommandHandler, ChatQueryHandler};
use crate::config::ChatServiceConfig;
use crate::domain::repository::{
    ActivityRepository, ConversationRepository, IdentityRepository, MediaStore,
    PresenceRepository,
};
use crate::domain::service::{
    ConversationService, LoginGuard, PresenceRules, PresenceService,
};
use crate::infrastructure::auth::{PasswordHasher, TokenCodec};
use crate::infrastructure::media::LocalMediaStore;
use crate::infrastructure::persistence::{
    PostgresActivityRepository, PostgresConversationRepository, PostgresIdentityRepository,
    PostgresPresenceRepository,
};
use crate::infrastructure::typing::TypingTracker;
use crate::interface::http::AppState;

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub state: AppState,
    pub presence: Arc<PresenceService>,
    pub typing: Arc<TypingTracker>,
    pub config: ChatServiceConfig,
}

/// 构建应用上下文
pub async fn initialize(app_config: &AppConfig) -> Result<ApplicationContext> {
    // 1. 服务配置视图
    let config = ChatServiceConfig::from_app_config(app_config);
    TokenCodec::ensure_nonempty_secret(&config.token_secret)
        .context("invalid auth configuration")?;

    // 2. PostgreSQL 连接池与迁移
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;
    let pool = Arc::new(pool);
    info!("database ready");

    // 3. 仓储
    let rules = PresenceRules::new(
        config.inactivity_window_seconds,
        config.lockout_threshold,
        config.lockout_minutes,
    );
    let presence_repo: Arc<dyn PresenceRepository> =
        Arc::new(PostgresPresenceRepository::new(pool.clone(), rules));
    let conversation_repo: Arc<dyn ConversationRepository> =
        Arc::new(PostgresConversationRepository::new(pool.clone()));
    let activity_repo: Arc<dyn ActivityRepository> =
        Arc::new(PostgresActivityRepository::new(pool.clone()));
    let identity_repo: Arc<dyn IdentityRepository> =
        Arc::new(PostgresIdentityRepository::new(pool.clone()));
    let media_store: Arc<dyn MediaStore> = Arc::new(LocalMediaStore::new(
        config.media_root_dir.clone(),
        config.max_voice_bytes,
    ));

    // 4. 领域服务
    let presence = Arc::new(PresenceService::new(
        presence_repo.clone(),
        activity_repo.clone(),
        config.inactivity_window_seconds,
        config.sweep_batch_size,
    ));
    let guard = Arc::new(LoginGuard::new(presence_repo));
    let conversations = Arc::new(ConversationService::new(
        conversation_repo,
        identity_repo.clone(),
        media_store,
        activity_repo.clone(),
        config.max_content_chars,
    ));

    // 5. 接口基础设施
    let passwords = Arc::new(PasswordHasher::default());
    let tokens = Arc::new(TokenCodec::new(
        &config.token_secret,
        config.token_ttl_seconds,
    ));
    let typing = Arc::new(TypingTracker::new(Duration::from_secs(
        config.typing_ttl_seconds,
    )));

    // 6. 应用处理器与共享状态
    let commands = Arc::new(ChatCommandHandler::new(
        presence.clone(),
        guard,
        conversations.clone(),
        identity_repo,
        activity_repo,
        passwords,
        tokens.clone(),
        typing.clone(),
    ));
    let queries = Arc::new(ChatQueryHandler::new(
        presence.clone(),
        conversations,
        typing.clone(),
    ));

    let state = AppState {
        commands,
        queries,
        presence: presence.clone(),
        tokens,
    };

    Ok(ApplicationContext {
        state,
        presence,
        typing,
        config,
    })
}
