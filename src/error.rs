//! Bazaar Core 错误类型模块
//!
//! 定义服务统一的业务错误分类；基础设施层通过 `#[from]` 转换底层错误，
//! 接口层负责将每个分类映射为对应的 HTTP 状态码。

use thiserror::Error;

/// 业务错误分类
#[derive(Debug, Error)]
pub enum ChatError {
    /// 引用的会话/消息/用户不存在，或对调用方不可见
    #[error("{0}")]
    NotFound(String),

    /// 请求参数非法（空消息内容、缺失字段、负的游标等）
    #[error("{0}")]
    Validation(String),

    /// 调用方不是会话参与者
    #[error("{0}")]
    Forbidden(String),

    /// 缺失或无效的会话凭证
    #[error("unauthorized")]
    Unauthorized,

    /// 账号处于登录锁定期（用户可见，非致命）
    #[error("account locked, try again in {minutes_remaining} minute(s)")]
    AccountLocked { minutes_remaining: i64 },

    /// 底层存储不可用
    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),

    /// 其他内部错误
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ChatError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ChatError::Forbidden(msg.into())
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
