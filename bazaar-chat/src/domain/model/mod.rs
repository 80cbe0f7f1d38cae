//! 领域模型
//!
//! 在线状态、会话、消息与活动统计的核心类型。

use chrono::{DateTime, Utc};

/// 一个身份对应的在线状态行
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceSnapshot {
    pub user_id: i64,
    pub online: bool,
    pub last_seen_at: DateTime<Utc>,
    pub session_started_at: Option<DateTime<Utc>>,
    /// 累计在线时长（秒），在每次 online→offline 转换时累加
    pub total_online_secs: i64,
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl PresenceSnapshot {
    /// 新建身份的初始状态（离线，刚刚被看到）
    pub fn initial(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            online: false,
            last_seen_at: now,
            session_started_at: None,
            total_online_secs: 0,
            failed_login_count: 0,
            locked_until: None,
        }
    }
}

/// 对在线状态机的一次输入
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceAction {
    /// 活跃客户端的周期信号（每个经过认证的请求都会触发）
    Heartbeat,
    /// 显式上线（登录成功、页面激活）
    ExplicitOnline,
    /// 显式下线（登出、页面关闭）
    ExplicitOffline,
    /// 只读重估：仅把超时的在线会话关闭，不产生新的活跃痕迹
    Evaluate,
}

impl PresenceAction {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "heartbeat" => Some(Self::Heartbeat),
            "online" => Some(Self::ExplicitOnline),
            "offline" => Some(Self::ExplicitOffline),
            _ => None,
        }
    }
}

/// 状态机一次转换的结果
#[derive(Clone, Debug)]
pub struct PresenceTransition {
    pub next: PresenceSnapshot,
    /// 本次转换由 offline 变为 online
    pub went_online: bool,
    /// 本次转换由 online 变为 offline
    pub went_offline: bool,
    /// 本次转换累加进 total_online_secs 的秒数
    pub flushed_secs: i64,
}

/// 登录锁定检查结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    /// 锁定中，带剩余分钟数
    Locked { minutes_remaining: i64 },
    /// 曾经锁定但已过期，需要惰性清除
    Expired,
    /// 未锁定
    Unlocked,
}

/// 一次失败登录记录后的结果
#[derive(Clone, Debug)]
pub struct LockoutOutcome {
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    /// 本次失败是否触发了新的锁定
    pub just_locked: bool,
}

/// 两个身份之间去重后的会话
#[derive(Clone, Debug)]
pub struct Conversation {
    pub id: i64,
    pub initiator_id: i64,
    pub peer_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user_id: i64) -> bool {
        self.initiator_id == user_id || self.peer_id == user_id
    }

    /// 会话中的另一方
    pub fn other_participant(&self, user_id: i64) -> Option<i64> {
        if self.initiator_id == user_id {
            Some(self.peer_id)
        } else if self.peer_id == user_id {
            Some(self.initiator_id)
        } else {
            None
        }
    }
}

/// 会话内的一条消息
#[derive(Clone, Debug)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    /// 纯语音/附件消息时为空
    pub content: Option<String>,
    pub attachment_path: Option<String>,
    pub voice_duration_secs: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_deleted: bool,
}

/// 待写入的消息
#[derive(Clone, Debug)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    pub attachment_path: Option<String>,
    pub voice_duration_secs: Option<i32>,
}

/// 消息拉取过滤器
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageFilter {
    All,
    /// 只取对方发来的未读消息
    UnreadOnly,
}

/// 对外暴露的用户状态视图
#[derive(Clone, Debug)]
pub struct UserStatus {
    pub user_id: i64,
    pub online: bool,
    pub last_seen_at: DateTime<Utc>,
}

/// 活动统计的事件类型，对应 activity_counters 的一列
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    Login,
    MessageSent,
    MessageRead,
    SessionClosed,
}

impl ActivityKind {
    /// activity_counters 表中的列名
    pub fn as_column(&self) -> &'static str {
        match self {
            ActivityKind::Login => "logins",
            ActivityKind::MessageSent => "messages_sent",
            ActivityKind::MessageRead => "messages_read",
            ActivityKind::SessionClosed => "sessions_closed",
        }
    }
}

/// 身份存储中的用户记录
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}
