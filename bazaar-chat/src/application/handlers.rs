//! 应用层处理器
//!
//! 命令/查询的编排入口：登录流程（防护 → 凭证校验 → 在线状态）、
//! 会话操作转发、轮询响应拼装。在线状态与活动统计是旁路，
//! 错误在这里被吞掉；会话与消息操作的错误原样上抛。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use bazaar_core::error::{ChatError, Result};
use bazaar_core::utils::day_of;

use crate::application::commands::{
    DeleteMessage, Login, Logout, MarkConversationRead, MarkMessageRead, NotifyTyping,
    OpenConversation, PostMessage, PostVoiceMessage, TouchPresence,
};
use crate::application::queries::{
    ConversationUnreadCount, FetchMessages, PollNewMessages, UserStatuses,
};
use crate::domain::model::{ActivityKind, Conversation, Message, MessageFilter, PresenceAction, UserStatus};
use crate::domain::repository::{ActivityRepository, IdentityRepository};
use crate::domain::service::{ConversationService, LoginGuard, PresenceService};
use crate::infrastructure::auth::{PasswordHasher, TokenCodec};
use crate::infrastructure::typing::TypingTracker;

/// 登录成功的结果
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub user_id: i64,
}

/// 轮询新消息的结果
#[derive(Clone, Debug)]
pub struct PollResult {
    pub messages: Vec<Message>,
    pub is_typing: bool,
    pub current_user_id: i64,
}

pub struct ChatCommandHandler {
    presence: Arc<PresenceService>,
    guard: Arc<LoginGuard>,
    conversations: Arc<ConversationService>,
    identities: Arc<dyn IdentityRepository>,
    activity: Arc<dyn ActivityRepository>,
    passwords: Arc<PasswordHasher>,
    tokens: Arc<TokenCodec>,
    typing: Arc<TypingTracker>,
}

impl ChatCommandHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        presence: Arc<PresenceService>,
        guard: Arc<LoginGuard>,
        conversations: Arc<ConversationService>,
        identities: Arc<dyn IdentityRepository>,
        activity: Arc<dyn ActivityRepository>,
        passwords: Arc<PasswordHasher>,
        tokens: Arc<TokenCodec>,
        typing: Arc<TypingTracker>,
    ) -> Self {
        Self {
            presence,
            guard,
            conversations,
            identities,
            activity,
            passwords,
            tokens,
            typing,
        }
    }

    /// 登录：锁定检查先于凭证校验，锁定中的账号直接短路
    pub async fn login(&self, command: Login, now: DateTime<Utc>) -> Result<LoginOutcome> {
        let Some(user) = self.identities.find_by_username(&command.username).await? else {
            info!(username = %command.username, "login rejected: unknown user");
            return Err(ChatError::Unauthorized);
        };

        self.guard.ensure_not_locked(user.id, now).await?;

        if !self.passwords.verify(&command.password, &user.password_hash) {
            let outcome = self.guard.record_failure(user.id, now).await?;
            info!(
                user_id = user.id,
                failed_attempts = outcome.failed_login_count,
                "login rejected: bad credentials"
            );
            return Err(ChatError::Unauthorized);
        }

        self.guard.record_success(user.id).await?;
        self.presence
            .touch_best_effort(user.id, PresenceAction::ExplicitOnline, now)
            .await;
        if let Err(err) = self
            .activity
            .bump(user.id, day_of(now), ActivityKind::Login, 1)
            .await
        {
            tracing::debug!(user_id = user.id, error = %err, "login activity bump failed, ignoring");
        }

        let token = self.tokens.issue(user.id, now)?;
        info!(user_id = user.id, "user logged in");
        Ok(LoginOutcome {
            token,
            user_id: user.id,
        })
    }

    pub async fn logout(&self, command: Logout, now: DateTime<Utc>) -> Result<()> {
        self.presence
            .touch_best_effort(command.user_id, PresenceAction::ExplicitOffline, now)
            .await;
        info!(user_id = command.user_id, "user logged out");
        Ok(())
    }

    /// 显式的在线状态端点；失败记日志后静默降级
    pub async fn touch_presence(&self, command: TouchPresence, now: DateTime<Utc>) -> Result<()> {
        self.presence
            .touch_best_effort(command.user_id, command.action, now)
            .await;
        Ok(())
    }

    pub async fn open_conversation(
        &self,
        command: OpenConversation,
        now: DateTime<Utc>,
    ) -> Result<(Conversation, bool)> {
        self.conversations
            .open_conversation(command.initiator_id, command.peer_user_id, now)
            .await
    }

    pub async fn post_message(&self, command: PostMessage, now: DateTime<Utc>) -> Result<Message> {
        self.conversations
            .post_message(command.conversation_id, command.sender_id, &command.content, now)
            .await
    }

    pub async fn post_voice_message(
        &self,
        command: PostVoiceMessage,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        self.conversations
            .post_voice_message(
                command.conversation_id,
                command.sender_id,
                &command.payload,
                command.duration_secs,
                now,
            )
            .await
    }

    pub async fn mark_conversation_read(
        &self,
        command: MarkConversationRead,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.conversations
            .mark_all_read(command.conversation_id, command.viewer_id, now)
            .await
    }

    pub async fn mark_message_read(
        &self,
        command: MarkMessageRead,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.conversations
            .mark_message_read(command.message_id, command.viewer_id, now)
            .await
    }

    pub async fn delete_message(&self, command: DeleteMessage) -> Result<()> {
        self.conversations
            .delete_message(command.message_id, command.requester_id)
            .await
    }

    /// 正在输入通知：仅在内存里留痕，进程重启即丢（尽力而为）
    pub async fn notify_typing(&self, command: NotifyTyping) -> Result<()> {
        self.conversations
            .load_for_participant(command.conversation_id, command.user_id)
            .await?;
        self.typing.notify(command.conversation_id, command.user_id);
        Ok(())
    }
}

pub struct ChatQueryHandler {
    presence: Arc<PresenceService>,
    conversations: Arc<ConversationService>,
    typing: Arc<TypingTracker>,
}

impl ChatQueryHandler {
    pub fn new(
        presence: Arc<PresenceService>,
        conversations: Arc<ConversationService>,
        typing: Arc<TypingTracker>,
    ) -> Self {
        Self {
            presence,
            conversations,
            typing,
        }
    }

    pub async fn fetch_messages(
        &self,
        query: FetchMessages,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        let filter = if query.unread_only {
            MessageFilter::UnreadOnly
        } else {
            MessageFilter::All
        };
        self.conversations
            .fetch_messages(query.conversation_id, query.viewer_id, filter, now)
            .await
    }

    pub async fn poll_new_messages(
        &self,
        query: PollNewMessages,
        now: DateTime<Utc>,
    ) -> Result<PollResult> {
        let conversation = self
            .conversations
            .load_for_participant(query.conversation_id, query.viewer_id)
            .await?;
        let messages = self
            .conversations
            .poll_new_messages(
                query.conversation_id,
                query.viewer_id,
                query.last_message_id,
                now,
            )
            .await?;
        let is_typing = conversation
            .other_participant(query.viewer_id)
            .map(|peer| self.typing.is_typing(conversation.id, peer))
            .unwrap_or(false);
        Ok(PollResult {
            messages,
            is_typing,
            current_user_id: query.viewer_id,
        })
    }

    pub async fn conversation_unread_count(&self, query: ConversationUnreadCount) -> Result<i64> {
        self.conversations
            .unread_count(query.conversation_id, query.viewer_id)
            .await
    }

    pub async fn global_unread_count(&self, viewer_id: i64) -> Result<i64> {
        self.conversations.global_unread_count(viewer_id).await
    }

    pub async fn user_statuses(
        &self,
        query: UserStatuses,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserStatus>> {
        self.presence.statuses(&query.user_ids, now).await
    }

    pub async fn online_count(&self) -> Result<i64> {
        self.presence.online_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::fakes::{
        FakeActivityRepository, FakeConversationRepository, FakeIdentityRepository, FakeMediaStore,
        FakePresenceRepository,
    };
    use crate::domain::repository::PresenceRepository;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    struct Harness {
        commands: ChatCommandHandler,
        queries: ChatQueryHandler,
        presence_repo: Arc<FakePresenceRepository>,
        activity: Arc<FakeActivityRepository>,
    }

    fn harness() -> Harness {
        let presence_repo = Arc::new(FakePresenceRepository::default());
        let activity: Arc<FakeActivityRepository> = Arc::new(FakeActivityRepository::default());
        // 测试里用低迭代数，校验走哈希串里内嵌的迭代数
        let passwords = Arc::new(PasswordHasher::new(1_000));

        let identities = Arc::new(FakeIdentityRepository::default());
        identities.add_user(1, "alice", &passwords.hash("correct horse"));
        identities.add_user(2, "bob", &passwords.hash("hunter2"));

        let presence = Arc::new(PresenceService::new(
            presence_repo.clone(),
            activity.clone(),
            300,
            100,
        ));
        let guard = Arc::new(LoginGuard::new(presence_repo.clone()));
        let conversations = Arc::new(ConversationService::new(
            Arc::new(FakeConversationRepository::default()),
            identities.clone(),
            Arc::new(FakeMediaStore::default()),
            activity.clone(),
            4000,
        ));
        let tokens = Arc::new(TokenCodec::new("test-secret", 3600));
        let typing = Arc::new(TypingTracker::new(std::time::Duration::from_secs(6)));

        let commands = ChatCommandHandler::new(
            presence.clone(),
            guard,
            conversations.clone(),
            identities,
            activity.clone(),
            passwords,
            tokens,
            typing.clone(),
        );
        let queries = ChatQueryHandler::new(presence, conversations, typing);
        Harness {
            commands,
            queries,
            presence_repo,
            activity,
        }
    }

    fn login(username: &str, password: &str) -> Login {
        Login {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn successful_login_issues_token_and_marks_online() {
        let h = harness();
        let outcome = h
            .commands
            .login(login("alice", "correct horse"), at(0))
            .await
            .unwrap();
        assert_eq!(outcome.user_id, 1);
        assert!(!outcome.token.is_empty());

        let snapshot = h.presence_repo.get(1).await.unwrap().unwrap();
        assert!(snapshot.online);
        assert_eq!(snapshot.failed_login_count, 0);
        assert_eq!(h.activity.total(1, ActivityKind::Login), 1);
    }

    #[tokio::test]
    async fn five_bad_passwords_lock_the_account() {
        let h = harness();
        for _ in 0..5 {
            match h.commands.login(login("alice", "wrong"), at(0)).await {
                Err(ChatError::Unauthorized) => {}
                other => panic!("expected unauthorized, got {other:?}"),
            }
        }

        // 锁定期内即使密码正确也会短路
        match h
            .commands
            .login(login("alice", "correct horse"), at(60))
            .await
        {
            Err(ChatError::AccountLocked { minutes_remaining }) => {
                assert_eq!(minutes_remaining, 29)
            }
            other => panic!("expected locked, got {other:?}"),
        }

        // 锁定到期后可以正常登录，计数被清零
        let after = at(0) + Duration::minutes(31);
        let outcome = h
            .commands
            .login(login("alice", "correct horse"), after)
            .await
            .unwrap();
        assert_eq!(outcome.user_id, 1);
        let snapshot = h.presence_repo.get(1).await.unwrap().unwrap();
        assert_eq!(snapshot.failed_login_count, 0);
        assert_eq!(snapshot.locked_until, None);
    }

    #[tokio::test]
    async fn unknown_user_is_unauthorized_without_counting() {
        let h = harness();
        match h.commands.login(login("nobody", "pw"), at(0)).await {
            Err(ChatError::Unauthorized) => {}
            other => panic!("expected unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn end_to_end_chat_cycle() {
        let h = harness();
        let alice = h
            .commands
            .login(login("alice", "correct horse"), at(0))
            .await
            .unwrap();
        let bob = h
            .commands
            .login(login("bob", "hunter2"), at(0))
            .await
            .unwrap();

        // alice 发起会话并发送 "Hello"
        let (conversation, is_new) = h
            .commands
            .open_conversation(
                OpenConversation {
                    initiator_id: alice.user_id,
                    peer_user_id: bob.user_id,
                },
                at(1),
            )
            .await
            .unwrap();
        assert!(is_new);
        h.commands
            .post_message(
                PostMessage {
                    conversation_id: conversation.id,
                    sender_id: alice.user_id,
                    content: "Hello".to_string(),
                },
                at(1),
            )
            .await
            .unwrap();

        // bob 轮询：拿到 "Hello"，读取即确认
        let polled = h
            .queries
            .poll_new_messages(
                PollNewMessages {
                    conversation_id: conversation.id,
                    viewer_id: bob.user_id,
                    last_message_id: Some(0),
                },
                at(6),
            )
            .await
            .unwrap();
        assert_eq!(polled.messages.len(), 1);
        assert_eq!(polled.messages[0].content.as_deref(), Some("Hello"));
        assert!(polled.messages[0].is_read);
        assert_eq!(polled.current_user_id, bob.user_id);
        assert!(!polled.is_typing);

        // alice 的全局未读为 0；bob 回复后变为 1
        assert_eq!(
            h.queries.global_unread_count(alice.user_id).await.unwrap(),
            0
        );
        h.commands
            .post_message(
                PostMessage {
                    conversation_id: conversation.id,
                    sender_id: bob.user_id,
                    content: "Hi".to_string(),
                },
                at(7),
            )
            .await
            .unwrap();
        assert_eq!(
            h.queries.global_unread_count(alice.user_id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn typing_indicator_reaches_the_peer_poll() {
        let h = harness();
        let (conversation, _) = h
            .commands
            .open_conversation(
                OpenConversation {
                    initiator_id: 1,
                    peer_user_id: 2,
                },
                at(0),
            )
            .await
            .unwrap();

        h.commands
            .notify_typing(NotifyTyping {
                conversation_id: conversation.id,
                user_id: 1,
            })
            .await
            .unwrap();

        // 对端能看到，正在输入的一方自己看不到
        let bob_poll = h
            .queries
            .poll_new_messages(
                PollNewMessages {
                    conversation_id: conversation.id,
                    viewer_id: 2,
                    last_message_id: None,
                },
                at(1),
            )
            .await
            .unwrap();
        assert!(bob_poll.is_typing);

        let alice_poll = h
            .queries
            .poll_new_messages(
                PollNewMessages {
                    conversation_id: conversation.id,
                    viewer_id: 1,
                    last_message_id: None,
                },
                at(1),
            )
            .await
            .unwrap();
        assert!(!alice_poll.is_typing);
    }
}
