//! Bazaar Core 公共库
//!
//! 为服务模块提供统一的配置加载、错误类型、日志初始化和指标收集能力

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing;
pub mod utils;

pub use config::{
    AppConfig, AuthConfig, ChatConfig, DatabaseConfig, LoggingConfig, MediaConfig, PresenceConfig,
    ServerConfig, app_config, load_config,
};
pub use error::*;
pub use utils::*;
