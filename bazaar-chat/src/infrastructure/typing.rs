//! 正在输入指示器（进程内，尽力而为）
//!
//! 以 (会话, 用户) 为键记录最近一次输入通知的时间，超过 TTL 视为停止。
//! 状态只存在内存里，进程重启即丢失。

use std::time::{Duration, Instant};

use dashmap::DashMap;

use bazaar_core::metrics::METRICS;

pub struct TypingTracker {
    entries: DashMap<(i64, i64), Instant>,
    ttl: Duration,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn notify(&self, conversation_id: i64, user_id: i64) {
        self.entries
            .insert((conversation_id, user_id), Instant::now());
        METRICS.typing_entries.set(self.entries.len() as i64);
    }

    pub fn is_typing(&self, conversation_id: i64, user_id: i64) -> bool {
        self.is_typing_at(conversation_id, user_id, Instant::now())
    }

    fn is_typing_at(&self, conversation_id: i64, user_id: i64, now: Instant) -> bool {
        self.entries
            .get(&(conversation_id, user_id))
            .map(|entry| now.duration_since(*entry) <= self.ttl)
            .unwrap_or(false)
    }

    /// 清掉过期条目；由后台任务周期调用
    pub fn prune(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, last| now.duration_since(*last) <= self.ttl);
        METRICS.typing_entries.set(self.entries.len() as i64);
    }
}
