//! 领域仓储与外部协作者端口
//!
//! 仓储接口需要作为 trait 对象注入，保留 async-trait。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use bazaar_core::error::Result;

use crate::domain::model::{
    ActivityKind, Conversation, LockState, LockoutOutcome, Message, MessageFilter, NewMessage,
    PresenceAction, PresenceSnapshot, PresenceTransition, UserRecord,
};

/// 在线状态仓储
///
/// `apply` 必须是原子的：实现方在行锁（或等价机制）下读取当前快照、
/// 运行纯状态机、写回结果，避免并发请求重复累计会话时长。
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// 原子应用一次状态机转换；目标行不存在时先以初始状态建行
    async fn apply(
        &self,
        user_id: i64,
        action: PresenceAction,
        now: DateTime<Utc>,
    ) -> Result<PresenceTransition>;

    async fn get(&self, user_id: i64) -> Result<Option<PresenceSnapshot>>;

    /// 当前在线人数
    async fn online_count(&self) -> Result<i64>;

    /// 清扫分页：`online = true` 且 `last_seen_at < cutoff` 的用户，
    /// 按 user_id 升序、从 `after_user_id` 之后取一批
    async fn list_stale_online(
        &self,
        cutoff: DateTime<Utc>,
        after_user_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>>;

    /// 登录失败计数；达到阈值时附带设置锁定截止时间
    async fn record_login_failure(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<LockoutOutcome>;

    /// 登录成功：清零计数并解除锁定
    async fn record_login_success(&self, user_id: i64) -> Result<()>;

    /// 锁定检查；过期的锁定作为副作用被惰性清除
    async fn check_lock(&self, user_id: i64, now: DateTime<Utc>) -> Result<LockState>;
}

/// 会话与消息仓储
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 按无序对查找或创建会话；必须满足交换律且并发安全。
    /// 返回会话以及是否为本次新建。
    async fn get_or_create(
        &self,
        a_id: i64,
        b_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Conversation, bool)>;

    async fn get(&self, conversation_id: i64) -> Result<Option<Conversation>>;

    /// 追加消息并推进会话的 updated_at
    async fn insert_message(&self, message: NewMessage, now: DateTime<Utc>) -> Result<Message>;

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>>;

    /// 按 (created_at, id) 升序取消息，软删除的不返回；
    /// 同一事务内把返回集中对方发来的未读消息置为已读（读取即确认）。
    /// 返回消息列表与本次置为已读的条数。
    async fn fetch_and_mark_read(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        filter: MessageFilter,
        since_message_id: Option<i64>,
    ) -> Result<(Vec<Message>, u64)>;

    /// 批量把对方发来的未读消息置为已读，返回翻转条数
    async fn mark_all_read(&self, conversation_id: i64, viewer_id: i64) -> Result<u64>;

    /// 单条置为已读；只在消息未读且发送者不是 viewer 时生效
    async fn mark_message_read(&self, message_id: i64, viewer_id: i64) -> Result<bool>;

    /// 软删除；只对发送者本人的未删除消息生效。已读/未读不受影响，
    /// 删除后的消息从列表与未读统计中消失
    async fn soft_delete_message(&self, message_id: i64, sender_id: i64) -> Result<bool>;

    /// viewer 在单个会话中的未读数（排除软删除与自己发送的）
    async fn unread_count(&self, conversation_id: i64, viewer_id: i64) -> Result<i64>;

    /// viewer 参与的全部会话的未读总数
    async fn global_unread_count(&self, viewer_id: i64) -> Result<i64>;
}

/// 活动统计仓储：按 (user_id, 日期) 维护类型化计数器，只增不减
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn bump(
        &self,
        user_id: i64,
        day: NaiveDate,
        kind: ActivityKind,
        amount: i64,
    ) -> Result<()>;
}

/// 身份存储端口（凭证校验所需的最小切面）
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn exists(&self, user_id: i64) -> Result<bool>;
}

/// 媒体存储端口：落盘语音消息负载，返回可存储在消息行上的相对路径
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store_voice(&self, payload: &[u8], now: DateTime<Utc>) -> Result<String>;
}
