//! 后台离线清扫任务
//!
//! 与请求处理解耦：固定周期扫描在线但超过活跃窗口没有活动的用户，
//! 强制其下线并结算会话时长。顺带清理过期的输入指示。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::domain::service::PresenceService;
use crate::infrastructure::typing::TypingTracker;

pub fn spawn(
    presence: Arc<PresenceService>,
    typing: Arc<TypingTracker>,
    interval_seconds: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一个 tick 立即触发，跳过：启动时没有可清扫的积压
        ticker.tick().await;

        loop {
            ticker.tick().await;
            typing.prune();
            if let Err(err) = presence.sweep_once(Utc::now()).await {
                warn!(error = %err, "inactivity sweep failed");
            }
        }
    })
}
