//! 会话与消息的 PostgreSQL 仓储
//!
//! 会话唯一性由 (user_lo, user_hi) 规范化唯一索引保证：并发的
//! `get_or_create(A,B)` / `get_or_create(B,A)` 最多只会落一行。
//! 读取即确认在同一事务内完成。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use bazaar_core::error::Result;

use crate::domain::model::{Conversation, Message, MessageFilter, NewMessage};
use crate::domain::repository::ConversationRepository;

pub struct PostgresConversationRepository {
    pool: Arc<PgPool>,
}

impl PostgresConversationRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn conversation_from_row(row: &PgRow) -> Conversation {
        Conversation {
            id: row.get("id"),
            initiator_id: row.get("initiator_id"),
            peer_id: row.get("peer_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn message_from_row(row: &PgRow) -> Message {
        Message {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            content: row.get("content"),
            attachment_path: row.get("attachment_path"),
            voice_duration_secs: row.get("voice_duration_secs"),
            created_at: row.get("created_at"),
            is_read: row.get("is_read"),
            is_deleted: row.get("is_deleted"),
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, attachment_path, \
     voice_duration_secs, created_at, is_read, is_deleted";

#[async_trait]
impl ConversationRepository for PostgresConversationRepository {
    async fn get_or_create(
        &self,
        a_id: i64,
        b_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Conversation, bool)> {
        // 先尝试插入；撞上唯一索引说明这对用户已有会话
        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (initiator_id, peer_id, user_lo, user_hi, created_at, updated_at)
            VALUES ($1, $2, LEAST($1, $2), GREATEST($1, $2), $3, $3)
            ON CONFLICT (user_lo, user_hi) DO NOTHING
            RETURNING id, initiator_id, peer_id, created_at, updated_at
            "#,
        )
        .bind(a_id)
        .bind(b_id)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((Self::conversation_from_row(&row), true));
        }

        let row = sqlx::query(
            r#"
            SELECT id, initiator_id, peer_id, created_at, updated_at
            FROM conversations
            WHERE user_lo = LEAST($1, $2) AND user_hi = GREATEST($1, $2)
            "#,
        )
        .bind(a_id)
        .bind(b_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok((Self::conversation_from_row(&row), false))
    }

    async fn get(&self, conversation_id: i64) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            r#"
            SELECT id, initiator_id, peer_id, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| Self::conversation_from_row(&row)))
    }

    async fn insert_message(&self, message: NewMessage, now: DateTime<Utc>) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO messages (conversation_id, sender_id, content, attachment_path,
                                  voice_duration_secs, created_at, is_read, is_deleted)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(&message.attachment_path)
        .bind(message.voice_duration_secs)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // 每条新消息都推进会话的 updated_at
        sqlx::query("UPDATE conversations SET updated_at = $2 WHERE id = $1")
            .bind(message.conversation_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Self::message_from_row(&row))
    }

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(message_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| Self::message_from_row(&row)))
    }

    async fn fetch_and_mark_read(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        filter: MessageFilter,
        since_message_id: Option<i64>,
    ) -> Result<(Vec<Message>, u64)> {
        let unread_only = matches!(filter, MessageFilter::UnreadOnly);
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1
              AND is_deleted = FALSE
              AND id > COALESCE($3, 0)
              AND ($4 = FALSE OR (is_read = FALSE AND sender_id <> $2))
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(conversation_id)
        .bind(viewer_id)
        .bind(since_message_id)
        .bind(unread_only)
        .fetch_all(&mut *tx)
        .await?;

        let mut messages: Vec<Message> = rows.iter().map(Self::message_from_row).collect();

        // 读取即确认：返回集中对方发来的未读消息在同一事务里置为已读
        let to_mark: Vec<i64> = messages
            .iter()
            .filter(|m| m.sender_id != viewer_id && !m.is_read)
            .map(|m| m.id)
            .collect();

        let mut marked = 0u64;
        if !to_mark.is_empty() {
            marked = sqlx::query(
                "UPDATE messages SET is_read = TRUE WHERE id = ANY($1) AND is_read = FALSE",
            )
            .bind(&to_mark)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            for message in messages.iter_mut() {
                if to_mark.contains(&message.id) {
                    message.is_read = true;
                }
            }
        }

        tx.commit().await?;
        Ok((messages, marked))
    }

    async fn mark_all_read(&self, conversation_id: i64, viewer_id: i64) -> Result<u64> {
        let marked = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND is_read = FALSE
              AND is_deleted = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(viewer_id)
        .execute(&*self.pool)
        .await?
        .rows_affected();

        Ok(marked)
    }

    async fn mark_message_read(&self, message_id: i64, viewer_id: i64) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(message_id)
        .bind(viewer_id)
        .execute(&*self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn soft_delete_message(&self, message_id: i64, sender_id: i64) -> Result<bool> {
        let deleted = sqlx::query(
            r#"
            UPDATE messages
            SET is_deleted = TRUE
            WHERE id = $1 AND sender_id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(message_id)
        .bind(sender_id)
        .execute(&*self.pool)
        .await?
        .rows_affected();

        Ok(deleted > 0)
    }

    async fn unread_count(&self, conversation_id: i64, viewer_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND is_read = FALSE
              AND is_deleted = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(viewer_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count)
    }

    async fn global_unread_count(&self, viewer_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages m
            INNER JOIN conversations c ON c.id = m.conversation_id
            WHERE (c.initiator_id = $1 OR c.peer_id = $1)
              AND m.sender_id <> $1
              AND m.is_read = FALSE
              AND m.is_deleted = FALSE
            "#,
        )
        .bind(viewer_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count)
    }
}
