//! 聊天服务配置
//!
//! 从应用配置拼装本服务需要的参数视图。

use bazaar_core::config::AppConfig;

#[derive(Debug, Clone)]
pub struct ChatServiceConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub inactivity_window_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub sweep_batch_size: i64,
    pub lockout_threshold: i32,
    pub lockout_minutes: i64,
    pub typing_ttl_seconds: u64,
    pub max_content_chars: usize,
    pub token_secret: String,
    pub token_ttl_seconds: i64,
    pub media_root_dir: String,
    pub max_voice_bytes: usize,
}

impl ChatServiceConfig {
    pub fn from_app_config(app: &AppConfig) -> Self {
        Self {
            database_url: app.database.url.clone(),
            max_connections: app.database.max_connections,
            inactivity_window_seconds: app.presence.inactivity_window_seconds,
            sweep_interval_seconds: app.presence.sweep_interval_seconds,
            sweep_batch_size: app.presence.sweep_batch_size,
            lockout_threshold: app.presence.lockout_threshold,
            lockout_minutes: app.presence.lockout_minutes,
            typing_ttl_seconds: app.chat.typing_ttl_seconds,
            max_content_chars: app.chat.max_content_chars,
            token_secret: app.auth.token_secret.clone(),
            token_ttl_seconds: app.auth.token_ttl_seconds,
            media_root_dir: app.media.root_dir.clone(),
            max_voice_bytes: app.media.max_voice_bytes,
        }
    }
}
