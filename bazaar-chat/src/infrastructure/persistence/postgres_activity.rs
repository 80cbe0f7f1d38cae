//! 活动统计的 PostgreSQL 仓储
//!
//! (user_id, 日期) 维度的类型化计数器，只增 upsert。调用方把这里当作
//! 旁路遥测：失败只记日志，不影响主流程。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use bazaar_core::error::Result;

use crate::domain::model::ActivityKind;
use crate::domain::repository::ActivityRepository;

pub struct PostgresActivityRepository {
    pool: Arc<PgPool>,
}

impl PostgresActivityRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for PostgresActivityRepository {
    async fn bump(
        &self,
        user_id: i64,
        day: NaiveDate,
        kind: ActivityKind,
        amount: i64,
    ) -> Result<()> {
        // 列名来自固定枚举，不拼接任何外部输入
        let column = kind.as_column();
        let sql = format!(
            r#"
            INSERT INTO activity_counters (user_id, day, {column})
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, day)
            DO UPDATE SET {column} = activity_counters.{column} + EXCLUDED.{column}
            "#
        );

        sqlx::query(&sql)
            .bind(user_id)
            .bind(day)
            .bind(amount)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }
}
