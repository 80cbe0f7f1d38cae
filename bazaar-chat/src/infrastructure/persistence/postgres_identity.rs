//! 身份存储的 PostgreSQL 适配
//!
//! 身份体系整体是外部协作者；这里只读登录流程需要的最小切面。

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use bazaar_core::error::Result;

use crate::domain::model::UserRecord;
use crate::domain::repository::IdentityRepository;

pub struct PostgresIdentityRepository {
    pool: Arc<PgPool>,
}

impl PostgresIdentityRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PostgresIdentityRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| UserRecord {
            id: row.get("id"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
        }))
    }

    async fn exists(&self, user_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(found.is_some())
    }
}
