//! 在线状态领域服务
//!
//! 把状态机转换接到仓储上，负责指标、日志与活动统计的旁路记录，
//! 并承载后台清扫的分批扫描逻辑。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use bazaar_core::error::Result;
use bazaar_core::metrics::METRICS;
use bazaar_core::utils::day_of;

use crate::domain::model::{
    ActivityKind, PresenceAction, PresenceTransition, UserStatus,
};
use crate::domain::repository::{ActivityRepository, PresenceRepository};

pub struct PresenceService {
    repository: Arc<dyn PresenceRepository>,
    activity: Arc<dyn ActivityRepository>,
    inactivity_window: Duration,
    sweep_batch_size: i64,
}

impl PresenceService {
    pub fn new(
        repository: Arc<dyn PresenceRepository>,
        activity: Arc<dyn ActivityRepository>,
        inactivity_window_seconds: i64,
        sweep_batch_size: i64,
    ) -> Self {
        Self {
            repository,
            activity,
            inactivity_window: Duration::seconds(inactivity_window_seconds),
            sweep_batch_size,
        }
    }

    /// 应用一次状态机输入并持久化
    pub async fn touch(
        &self,
        user_id: i64,
        action: PresenceAction,
        now: DateTime<Utc>,
    ) -> Result<PresenceTransition> {
        let transition = self.repository.apply(user_id, action, now).await?;

        if transition.went_online {
            METRICS
                .presence_transitions_total
                .with_label_values(&["online"])
                .inc();
            info!(user_id, "presence changed: offline -> online");
        }
        if transition.went_offline {
            METRICS
                .presence_transitions_total
                .with_label_values(&["offline"])
                .inc();
            info!(
                user_id,
                session_secs = transition.flushed_secs,
                "presence changed: online -> offline"
            );
            self.record_activity(user_id, now, ActivityKind::SessionClosed, 1)
                .await;
        }

        Ok(transition)
    }

    /// 旁路触达：失败只记日志，绝不阻塞承载它的主请求
    pub async fn touch_best_effort(&self, user_id: i64, action: PresenceAction, now: DateTime<Utc>) {
        if let Err(err) = self.touch(user_id, action, now).await {
            warn!(user_id, error = %err, "presence touch failed, ignoring");
        }
    }

    /// 批量查询用户状态；查询前对每个目标做一次只读重估，
    /// 超时的在线会话先被关闭再上报
    pub async fn statuses(&self, user_ids: &[i64], now: DateTime<Utc>) -> Result<Vec<UserStatus>> {
        let mut result = Vec::with_capacity(user_ids.len());
        for &user_id in user_ids {
            let transition = self
                .repository
                .apply(user_id, PresenceAction::Evaluate, now)
                .await?;
            result.push(UserStatus {
                user_id,
                online: transition.next.online,
                last_seen_at: transition.next.last_seen_at,
            });
        }
        Ok(result)
    }

    pub async fn online_count(&self) -> Result<i64> {
        self.repository.online_count().await
    }

    /// 清扫一轮：把 `online = true` 且超过活跃窗口没有活动的用户强制下线。
    /// 按 user_id 键集分页，避免无界扫描。返回本轮强制下线的人数。
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - self.inactivity_window;
        let mut after_user_id = 0;
        let mut forced = 0u64;

        loop {
            let batch = self
                .repository
                .list_stale_online(cutoff, after_user_id, self.sweep_batch_size)
                .await?;
            let Some(&last) = batch.last() else { break };

            for user_id in batch.iter().copied() {
                match self
                    .repository
                    .apply(user_id, PresenceAction::Evaluate, now)
                    .await
                {
                    Ok(transition) if transition.went_offline => {
                        forced += 1;
                        METRICS.sweep_forced_offline_total.inc();
                        METRICS
                            .presence_transitions_total
                            .with_label_values(&["offline"])
                            .inc();
                        debug!(
                            user_id,
                            session_secs = transition.flushed_secs,
                            "sweep forced inactive user offline"
                        );
                        self.record_activity(user_id, now, ActivityKind::SessionClosed, 1)
                            .await;
                    }
                    // 在取批和应用之间重新活跃的用户：保持在线
                    Ok(_) => {}
                    Err(err) => {
                        warn!(user_id, error = %err, "sweep transition failed, skipping user");
                    }
                }
            }

            after_user_id = last;
            if (batch.len() as i64) < self.sweep_batch_size {
                break;
            }
        }

        if forced > 0 {
            info!(forced, "inactivity sweep finished");
        }
        Ok(forced)
    }

    /// 活动统计是旁路遥测：写失败只打日志
    async fn record_activity(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        kind: ActivityKind,
        amount: i64,
    ) {
        if let Err(err) = self.activity.bump(user_id, day_of(now), kind, amount).await {
            debug!(user_id, error = %err, "activity bump failed, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::fakes::{FakeActivityRepository, FakePresenceRepository};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn service(repo: Arc<FakePresenceRepository>) -> PresenceService {
        PresenceService::new(repo, Arc::new(FakeActivityRepository::default()), 300, 2)
    }

    #[tokio::test]
    async fn statuses_reevaluate_before_reporting() {
        let repo = Arc::new(FakePresenceRepository::default());
        let svc = service(repo.clone());

        // 用户 1 在 t=0 上线，之后没有任何活动
        svc.touch(1, PresenceAction::ExplicitOnline, at(0))
            .await
            .unwrap();
        // 用户 2 刚刚活跃
        svc.touch(2, PresenceAction::Heartbeat, at(400)).await.unwrap();

        let statuses = svc.statuses(&[1, 2], at(400)).await.unwrap();
        assert!(!statuses[0].online, "stale session must be closed on read");
        assert!(statuses[1].online);

        // 重估结算了用户 1 的会话时长（到其最后活动时间）
        let snapshot = repo.get(1).await.unwrap().unwrap();
        assert_eq!(snapshot.total_online_secs, 0);
        assert_eq!(snapshot.session_started_at, None);
    }

    #[tokio::test]
    async fn sweep_paginates_and_forces_offline() {
        let repo = Arc::new(FakePresenceRepository::default());
        let svc = service(repo.clone());

        // 五个用户上线后全部沉默；批量为 2，需要三页扫完
        for user_id in 1..=5 {
            svc.touch(user_id, PresenceAction::ExplicitOnline, at(0))
                .await
                .unwrap();
        }
        let forced = svc.sweep_once(at(1_000)).await.unwrap();
        assert_eq!(forced, 5);
        assert_eq!(svc.online_count().await.unwrap(), 0);

        // 幂等：再扫一轮没有可清理的
        assert_eq!(svc.sweep_once(at(1_100)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_skips_recently_active_users() {
        let repo = Arc::new(FakePresenceRepository::default());
        let svc = service(repo.clone());

        svc.touch(1, PresenceAction::ExplicitOnline, at(0)).await.unwrap();
        svc.touch(2, PresenceAction::Heartbeat, at(900)).await.unwrap();

        let forced = svc.sweep_once(at(1_000)).await.unwrap();
        assert_eq!(forced, 1);
        assert!(repo.get(2).await.unwrap().unwrap().online);
    }
}
