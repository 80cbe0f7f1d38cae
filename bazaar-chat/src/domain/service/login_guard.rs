//! 登录失败防护
//!
//! 连续失败登录计数与限时锁定。必须在凭证校验**之前**检查，
//! 让锁定中的账号直接短路并提示剩余时间。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use bazaar_core::error::{ChatError, Result};
use bazaar_core::metrics::METRICS;

use crate::domain::model::{LockState, LockoutOutcome};
use crate::domain::repository::PresenceRepository;

pub struct LoginGuard {
    repository: Arc<dyn PresenceRepository>,
}

impl LoginGuard {
    pub fn new(repository: Arc<dyn PresenceRepository>) -> Self {
        Self { repository }
    }

    /// 锁定中返回 `AccountLocked`；过期的锁定已被仓储惰性清除
    pub async fn ensure_not_locked(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        match self.repository.check_lock(user_id, now).await? {
            LockState::Locked { minutes_remaining } => {
                Err(ChatError::AccountLocked { minutes_remaining })
            }
            LockState::Expired | LockState::Unlocked => Ok(()),
        }
    }

    pub async fn record_failure(&self, user_id: i64, now: DateTime<Utc>) -> Result<LockoutOutcome> {
        let outcome = self.repository.record_login_failure(user_id, now).await?;
        METRICS.login_failures_total.inc();
        if outcome.just_locked {
            METRICS.account_lockouts_total.inc();
            warn!(
                user_id,
                failed_attempts = outcome.failed_login_count,
                locked_until = ?outcome.locked_until,
                "account locked after repeated login failures"
            );
        }
        Ok(outcome)
    }

    pub async fn record_success(&self, user_id: i64) -> Result<()> {
        self.repository.record_login_success(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::fakes::FakePresenceRepository;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn five_failures_lock_for_thirty_minutes() {
        let guard = LoginGuard::new(Arc::new(FakePresenceRepository::default()));
        let now = at(0);

        for _ in 0..4 {
            let outcome = guard.record_failure(7, now).await.unwrap();
            assert!(!outcome.just_locked);
        }
        assert!(guard.ensure_not_locked(7, now).await.is_ok());

        let outcome = guard.record_failure(7, now).await.unwrap();
        assert!(outcome.just_locked);

        match guard.ensure_not_locked(7, at(60)).await {
            Err(ChatError::AccountLocked { minutes_remaining }) => {
                assert_eq!(minutes_remaining, 29)
            }
            other => panic!("expected locked, got {other:?}"),
        }

        // 锁定到期后惰性解除
        let after = now + Duration::minutes(30) + Duration::seconds(1);
        assert!(guard.ensure_not_locked(7, after).await.is_ok());
    }

    #[tokio::test]
    async fn success_resets_counter_and_lock() {
        let repo = Arc::new(FakePresenceRepository::default());
        let guard = LoginGuard::new(repo.clone());
        let now = at(0);

        for _ in 0..5 {
            guard.record_failure(9, now).await.unwrap();
        }
        guard.record_success(9).await.unwrap();
        assert!(guard.ensure_not_locked(9, at(10)).await.is_ok());

        let snapshot = repo.get(9).await.unwrap().unwrap();
        assert_eq!(snapshot.failed_login_count, 0);
        assert_eq!(snapshot.locked_until, None);
    }
}
