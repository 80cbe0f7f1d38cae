//! 会话领域服务
//!
//! 会话生命周期与消息读写的业务规则：参与者校验、内容校验、
//! 读取即确认、未读聚合。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use bazaar_core::error::{ChatError, Result};
use bazaar_core::metrics::METRICS;
use bazaar_core::utils::day_of;

use crate::domain::model::{
    ActivityKind, Conversation, Message, MessageFilter, NewMessage,
};
use crate::domain::repository::{
    ActivityRepository, ConversationRepository, IdentityRepository, MediaStore,
};

pub struct ConversationService {
    conversations: Arc<dyn ConversationRepository>,
    identities: Arc<dyn IdentityRepository>,
    media: Arc<dyn MediaStore>,
    activity: Arc<dyn ActivityRepository>,
    max_content_chars: usize,
}

impl ConversationService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        identities: Arc<dyn IdentityRepository>,
        media: Arc<dyn MediaStore>,
        activity: Arc<dyn ActivityRepository>,
        max_content_chars: usize,
    ) -> Self {
        Self {
            conversations,
            identities,
            media,
            activity,
            max_content_chars,
        }
    }

    /// 查找或创建与对端的会话（无序对去重，幂等）
    pub async fn open_conversation(
        &self,
        initiator_id: i64,
        peer_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Conversation, bool)> {
        if initiator_id == peer_user_id {
            return Err(ChatError::validation(
                "cannot open a conversation with yourself",
            ));
        }
        if !self.identities.exists(peer_user_id).await? {
            return Err(ChatError::not_found("peer user not found"));
        }

        let (conversation, created) = self
            .conversations
            .get_or_create(initiator_id, peer_user_id, now)
            .await?;
        if created {
            METRICS.conversations_created_total.inc();
            info!(
                conversation_id = conversation.id,
                initiator_id, peer_user_id, "conversation created"
            );
        }
        Ok((conversation, created))
    }

    /// 加载会话并校验 viewer 是参与者
    pub async fn load_for_participant(
        &self,
        conversation_id: i64,
        viewer_id: i64,
    ) -> Result<Conversation> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| ChatError::not_found("conversation not found"))?;
        if !conversation.involves(viewer_id) {
            return Err(ChatError::forbidden(
                "caller is not a participant of this conversation",
            ));
        }
        Ok(conversation)
    }

    /// 追加文本消息
    pub async fn post_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        self.load_for_participant(conversation_id, sender_id).await?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::validation("message content must not be empty"));
        }
        if content.chars().count() > self.max_content_chars {
            return Err(ChatError::validation("message content too long"));
        }

        let message = self
            .conversations
            .insert_message(
                NewMessage {
                    conversation_id,
                    sender_id,
                    content: Some(content.to_string()),
                    attachment_path: None,
                    voice_duration_secs: None,
                },
                now,
            )
            .await?;

        METRICS.messages_sent_total.inc();
        self.record_activity(sender_id, now, ActivityKind::MessageSent, 1)
            .await;
        debug!(
            conversation_id,
            sender_id,
            message_id = message.id,
            "message stored"
        );
        Ok(message)
    }

    /// 追加语音消息：负载落盘后以附件形式入库，content 为空
    pub async fn post_voice_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        payload: &[u8],
        duration_secs: i32,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        self.load_for_participant(conversation_id, sender_id).await?;

        if payload.is_empty() {
            return Err(ChatError::validation("voice payload must not be empty"));
        }
        if duration_secs <= 0 {
            return Err(ChatError::validation("voice duration must be positive"));
        }

        let attachment_path = self.media.store_voice(payload, now).await?;
        let message = self
            .conversations
            .insert_message(
                NewMessage {
                    conversation_id,
                    sender_id,
                    content: None,
                    attachment_path: Some(attachment_path),
                    voice_duration_secs: Some(duration_secs),
                },
                now,
            )
            .await?;

        METRICS.messages_sent_total.inc();
        self.record_activity(sender_id, now, ActivityKind::MessageSent, 1)
            .await;
        Ok(message)
    }

    /// 拉取消息（升序）；副作用：返回集中对方发来的未读消息被置为已读
    pub async fn fetch_messages(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        filter: MessageFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        self.load_for_participant(conversation_id, viewer_id).await?;
        let (messages, marked) = self
            .conversations
            .fetch_and_mark_read(conversation_id, viewer_id, filter, None)
            .await?;
        self.after_mark_read(viewer_id, now, marked).await;
        Ok(messages)
    }

    /// 轮询新消息：`id > since_message_id`，同样读取即确认
    pub async fn poll_new_messages(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        since_message_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        if since_message_id.is_some_and(|id| id < 0) {
            return Err(ChatError::validation("last_message_id must not be negative"));
        }
        self.load_for_participant(conversation_id, viewer_id).await?;
        let (messages, marked) = self
            .conversations
            .fetch_and_mark_read(conversation_id, viewer_id, MessageFilter::All, since_message_id)
            .await?;
        self.after_mark_read(viewer_id, now, marked).await;
        Ok(messages)
    }

    /// 批量置为已读，返回翻转条数
    pub async fn mark_all_read(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.load_for_participant(conversation_id, viewer_id).await?;
        let marked = self
            .conversations
            .mark_all_read(conversation_id, viewer_id)
            .await?;
        self.after_mark_read(viewer_id, now, marked).await;
        Ok(marked)
    }

    /// 单条置为已读；对自己发送的消息是静默 no-op 而不是错误
    pub async fn mark_message_read(
        &self,
        message_id: i64,
        viewer_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let message = self
            .conversations
            .get_message(message_id)
            .await?
            .ok_or_else(|| ChatError::not_found("message not found"))?;
        self.load_for_participant(message.conversation_id, viewer_id)
            .await?;

        if message.sender_id == viewer_id {
            return Ok(false);
        }

        let updated = self
            .conversations
            .mark_message_read(message_id, viewer_id)
            .await?;
        if updated {
            self.after_mark_read(viewer_id, now, 1).await;
        }
        Ok(updated)
    }

    /// 软删除自己发送的消息；重复删除是幂等的 no-op
    pub async fn delete_message(&self, message_id: i64, requester_id: i64) -> Result<()> {
        let message = self
            .conversations
            .get_message(message_id)
            .await?
            .ok_or_else(|| ChatError::not_found("message not found"))?;
        self.load_for_participant(message.conversation_id, requester_id)
            .await?;
        if message.sender_id != requester_id {
            return Err(ChatError::forbidden("only the sender can delete a message"));
        }
        if message.is_deleted {
            return Ok(());
        }

        self.conversations
            .soft_delete_message(message_id, requester_id)
            .await?;
        info!(message_id, requester_id, "message soft-deleted");
        Ok(())
    }

    pub async fn unread_count(&self, conversation_id: i64, viewer_id: i64) -> Result<i64> {
        self.load_for_participant(conversation_id, viewer_id).await?;
        self.conversations
            .unread_count(conversation_id, viewer_id)
            .await
    }

    pub async fn global_unread_count(&self, viewer_id: i64) -> Result<i64> {
        self.conversations.global_unread_count(viewer_id).await
    }

    async fn after_mark_read(&self, viewer_id: i64, now: DateTime<Utc>, marked: u64) {
        if marked == 0 {
            return;
        }
        METRICS.messages_marked_read_total.inc_by(marked);
        self.record_activity(viewer_id, now, ActivityKind::MessageRead, marked as i64)
            .await;
    }

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
    use crate::domain::service::fakes::{
        FakeActivityRepository, FakeConversationRepository, FakeIdentityRepository, FakeMediaStore,
    };
    use chrono::TimeZone;

    const ALICE: i64 = 1;
    const BOB: i64 = 2;
    const MALLORY: i64 = 3;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn service() -> ConversationService {
        let identities = FakeIdentityRepository::default();
        identities.add_plain_user(ALICE, "alice");
        identities.add_plain_user(BOB, "bob");
        identities.add_plain_user(MALLORY, "mallory");
        ConversationService::new(
            Arc::new(FakeConversationRepository::default()),
            Arc::new(identities),
            Arc::new(FakeMediaStore::default()),
            Arc::new(FakeActivityRepository::default()),
            4000,
        )
    }

    #[tokio::test]
    async fn conversation_lookup_is_commutative() {
        let svc = service();
        let (c1, created1) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        let (c2, created2) = svc.open_conversation(BOB, ALICE, at(1)).await.unwrap();
        assert!(created1);
        assert!(!created2);
        assert_eq!(c1.id, c2.id);
    }

    #[tokio::test]
    async fn self_conversation_is_rejected() {
        let svc = service();
        match svc.open_conversation(ALICE, ALICE, at(0)).await {
            Err(ChatError::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_peer_is_not_found() {
        let svc = service();
        match svc.open_conversation(ALICE, 999, at(0)).await {
            Err(ChatError::NotFound(_)) => {}
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unread_counts_follow_send_and_fetch() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();

        for i in 0..3 {
            svc.post_message(conversation.id, ALICE, &format!("msg {i}"), at(10 + i))
                .await
                .unwrap();
        }

        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 3);
        assert_eq!(svc.unread_count(conversation.id, ALICE).await.unwrap(), 0);

        // 读取即确认
        let messages = svc
            .fetch_messages(conversation.id, BOB, MessageFilter::All, at(20))
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.is_read));
        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn senders_own_fetch_never_marks_own_messages() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        svc.post_message(conversation.id, ALICE, "hello", at(1))
            .await
            .unwrap();

        // 发送方自己拉取：消息保持未读
        let messages = svc
            .fetch_messages(conversation.id, ALICE, MessageFilter::All, at(2))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_read);
        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn poll_new_messages_cursor_and_read_side_effect() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        let first = svc
            .post_message(conversation.id, ALICE, "hello", at(1))
            .await
            .unwrap();
        let second = svc
            .post_message(conversation.id, ALICE, "are you there?", at(2))
            .await
            .unwrap();

        let polled = svc
            .poll_new_messages(conversation.id, BOB, Some(first.id), at(3))
            .await
            .unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].id, second.id);
        assert!(polled[0].is_read);

        // 第一条没有被返回，因此保持未读
        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 1);

        // 不带游标 = 全量
        let all = svc
            .poll_new_messages(conversation.id, BOB, None, at(4))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn global_unread_spans_conversations() {
        let svc = service();
        let (with_bob, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        let (with_mallory, _) = svc.open_conversation(MALLORY, ALICE, at(0)).await.unwrap();

        svc.post_message(with_bob.id, BOB, "one", at(1)).await.unwrap();
        svc.post_message(with_mallory.id, MALLORY, "two", at(2))
            .await
            .unwrap();
        svc.post_message(with_mallory.id, MALLORY, "three", at(3))
            .await
            .unwrap();

        assert_eq!(svc.global_unread_count(ALICE).await.unwrap(), 3);
        assert_eq!(svc.global_unread_count(BOB).await.unwrap(), 0);

        svc.fetch_messages(with_mallory.id, ALICE, MessageFilter::All, at(4))
            .await
            .unwrap();
        assert_eq!(svc.global_unread_count(ALICE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn non_participant_is_rejected() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        match svc.post_message(conversation.id, MALLORY, "hi", at(1)).await {
            Err(ChatError::Forbidden(_)) => {}
            other => panic!("expected forbidden, got {other:?}"),
        }
        match svc
            .fetch_messages(conversation.id, MALLORY, MessageFilter::All, at(2))
            .await
        {
            Err(ChatError::Forbidden(_)) => {}
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mark_message_read_on_own_message_is_a_noop() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        let message = svc
            .post_message(conversation.id, ALICE, "hello", at(1))
            .await
            .unwrap();

        assert!(!svc.mark_message_read(message.id, ALICE, at(2)).await.unwrap());
        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 1);

        assert!(svc.mark_message_read(message.id, BOB, at(3)).await.unwrap());
        // 已读状态单调：重复标记不再生效，也绝不会翻回未读
        assert!(!svc.mark_message_read(message.id, BOB, at(4)).await.unwrap());
        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn soft_deleted_messages_leave_listings_and_counts() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        let message = svc
            .post_message(conversation.id, ALICE, "oops", at(1))
            .await
            .unwrap();
        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 1);

        // 只有发送者本人可以删除
        match svc.delete_message(message.id, BOB).await {
            Err(ChatError::Forbidden(_)) => {}
            other => panic!("expected forbidden, got {other:?}"),
        }

        svc.delete_message(message.id, ALICE).await.unwrap();
        assert_eq!(svc.unread_count(conversation.id, BOB).await.unwrap(), 0);
        let messages = svc
            .fetch_messages(conversation.id, BOB, MessageFilter::All, at(2))
            .await
            .unwrap();
        assert!(messages.is_empty());

        // 重复删除幂等
        svc.delete_message(message.id, ALICE).await.unwrap();
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        match svc.post_message(conversation.id, ALICE, "   ", at(1)).await {
            Err(ChatError::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unread_only_filter_returns_only_the_other_sides_unread() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        svc.post_message(conversation.id, ALICE, "from alice", at(1))
            .await
            .unwrap();
        svc.post_message(conversation.id, BOB, "from bob", at(2))
            .await
            .unwrap();

        let unread = svc
            .fetch_messages(conversation.id, BOB, MessageFilter::UnreadOnly, at(3))
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].sender_id, ALICE);
    }

    #[tokio::test]
    async fn voice_message_is_stored_with_attachment() {
        let svc = service();
        let (conversation, _) = svc.open_conversation(ALICE, BOB, at(0)).await.unwrap();
        let message = svc
            .post_voice_message(conversation.id, ALICE, b"opus-bytes", 7, at(1))
            .await
            .unwrap();
        assert!(message.content.is_none());
        assert!(message.attachment_path.is_some());
        assert_eq!(message.voice_duration_secs, Some(7));

        match svc
            .post_voice_message(conversation.id, ALICE, b"", 7, at(2))
            .await
        {
            Err(ChatError::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
