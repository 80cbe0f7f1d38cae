//! 在线状态的 PostgreSQL 仓储
//!
//! 所有读-改-写都在 `SELECT ... FOR UPDATE` 行锁内完成：并发请求
//! 对同一用户的触达会串行化，会话时长不会被重复累计。状态计算
//! 本身复用领域层的纯转换函数。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use bazaar_core::error::Result;

use crate::domain::model::{
    LockState, LockoutOutcome, PresenceAction, PresenceSnapshot, PresenceTransition,
};
use crate::domain::repository::PresenceRepository;
use crate::domain::service::presence_rules::{
    self, PresenceRules, check_lock, on_login_failure, on_login_success,
};

pub struct PostgresPresenceRepository {
    pool: Arc<PgPool>,
    rules: PresenceRules,
}

impl PostgresPresenceRepository {
    pub fn new(pool: Arc<PgPool>, rules: PresenceRules) -> Self {
        Self { pool, rules }
    }

    fn snapshot_from_row(row: &PgRow) -> PresenceSnapshot {
        PresenceSnapshot {
            user_id: row.get("user_id"),
            online: row.get("online"),
            last_seen_at: row.get("last_seen_at"),
            session_started_at: row.get("session_started_at"),
            total_online_secs: row.get("total_online_secs"),
            failed_login_count: row.get("failed_login_count"),
            locked_until: row.get("locked_until"),
        }
    }

    /// 确保目标行存在后在行锁下取出当前快照
    async fn lock_row(
        tx: &mut sqlx::PgConnection,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<PresenceSnapshot> {
        sqlx::query(
            r#"
            INSERT INTO user_presence (user_id, online, last_seen_at)
            VALUES ($1, FALSE, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT user_id, online, last_seen_at, session_started_at,
                   total_online_secs, failed_login_count, locked_until
            FROM user_presence
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        Ok(Self::snapshot_from_row(&row))
    }
}

#[async_trait]
impl PresenceRepository for PostgresPresenceRepository {
    async fn apply(
        &self,
        user_id: i64,
        action: PresenceAction,
        now: DateTime<Utc>,
    ) -> Result<PresenceTransition> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_row(&mut tx, user_id, now).await?;
        let transition = presence_rules::apply(&self.rules, &current, action, now);

        sqlx::query(
            r#"
            UPDATE user_presence
            SET online = $2,
                last_seen_at = $3,
                session_started_at = $4,
                total_online_secs = $5
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(transition.next.online)
        .bind(transition.next.last_seen_at)
        .bind(transition.next.session_started_at)
        .bind(transition.next.total_online_secs)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transition)
    }

    async fn get(&self, user_id: i64) -> Result<Option<PresenceSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, online, last_seen_at, session_started_at,
                   total_online_secs, failed_login_count, locked_until
            FROM user_presence
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| Self::snapshot_from_row(&row)))
    }

    async fn online_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_presence WHERE online = TRUE")
                .fetch_one(&*self.pool)
                .await?;
        Ok(count)
    }

    async fn list_stale_online(
        &self,
        cutoff: DateTime<Utc>,
        after_user_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id
            FROM user_presence
            WHERE online = TRUE AND last_seen_at < $1 AND user_id > $2
            ORDER BY user_id ASC
            LIMIT $3
            "#,
        )
        .bind(cutoff)
        .bind(after_user_id)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
    }

    async fn record_login_failure(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<LockoutOutcome> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_row(&mut tx, user_id, now).await?;
        let (next, outcome) = on_login_failure(&self.rules, &current, now);

        sqlx::query(
            r#"
            UPDATE user_presence
            SET failed_login_count = $2, locked_until = $3
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(next.failed_login_count)
        .bind(next.locked_until)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn record_login_success(&self, user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_row(&mut tx, user_id, Utc::now()).await?;
        let next = on_login_success(&current);

        sqlx::query(
            r#"
            UPDATE user_presence
            SET failed_login_count = $2, locked_until = $3
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(next.failed_login_count)
        .bind(next.locked_until)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn check_lock(&self, user_id: i64, now: DateTime<Utc>) -> Result<LockState> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_row(&mut tx, user_id, now).await?;
        let state = check_lock(&current, now);

        // 惰性清除过期的锁定
        if state == LockState::Expired {
            sqlx::query("UPDATE user_presence SET locked_until = NULL WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(state)
    }
}
