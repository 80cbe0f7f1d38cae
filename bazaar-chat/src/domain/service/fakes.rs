//! 测试用内存仓储
//!
//! 与 PostgreSQL 实现共享同一套纯转换规则，保证领域服务测试覆盖的
//! 是真实的状态机语义而不是桩行为。

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use bazaar_core::error::Result;

use crate::domain::model::{
    ActivityKind, Conversation, LockState, LockoutOutcome, Message, MessageFilter, NewMessage,
    PresenceAction, PresenceSnapshot, PresenceTransition, UserRecord,
};
use crate::domain::repository::{
    ActivityRepository, ConversationRepository, IdentityRepository, MediaStore,
    PresenceRepository,
};
use crate::domain::service::presence_rules::{
    self, PresenceRules, check_lock, on_login_failure, on_login_success,
};

#[derive(Default)]
pub struct FakePresenceRepository {
    rules: PresenceRules,
    rows: Mutex<HashMap<i64, PresenceSnapshot>>,
}

#[async_trait]
impl PresenceRepository for FakePresenceRepository {
    async fn apply(
        &self,
        user_id: i64,
        action: PresenceAction,
        now: DateTime<Utc>,
    ) -> Result<PresenceTransition> {
        let mut rows = self.rows.lock().unwrap();
        let current = rows
            .entry(user_id)
            .or_insert_with(|| PresenceSnapshot::initial(user_id, now));
        let transition = presence_rules::apply(&self.rules, current, action, now);
        *current = transition.next.clone();
        Ok(transition)
    }

    async fn get(&self, user_id: i64) -> Result<Option<PresenceSnapshot>> {
        Ok(self.rows.lock().unwrap().get(&user_id).cloned())
    }

    async fn online_count(&self) -> Result<i64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| row.online)
            .count() as i64)
    }

    async fn list_stale_online(
        &self,
        cutoff: DateTime<Utc>,
        after_user_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let rows = self.rows.lock().unwrap();
        let mut ids: Vec<i64> = rows
            .values()
            .filter(|row| row.online && row.last_seen_at < cutoff && row.user_id > after_user_id)
            .map(|row| row.user_id)
            .collect();
        ids.sort_unstable();
        ids.truncate(limit as usize);
        Ok(ids)
    }

    async fn record_login_failure(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<LockoutOutcome> {
        let mut rows = self.rows.lock().unwrap();
        let current = rows
            .entry(user_id)
            .or_insert_with(|| PresenceSnapshot::initial(user_id, now));
        let (next, outcome) = on_login_failure(&self.rules, current, now);
        *current = next;
        Ok(outcome)
    }

    async fn record_login_success(&self, user_id: i64) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(current) = rows.get_mut(&user_id) {
            *current = on_login_success(current);
        }
        Ok(())
    }

    async fn check_lock(&self, user_id: i64, now: DateTime<Utc>) -> Result<LockState> {
        let mut rows = self.rows.lock().unwrap();
        let Some(current) = rows.get_mut(&user_id) else {
            return Ok(LockState::Unlocked);
        };
        let state = check_lock(current, now);
        if state == LockState::Expired {
            current.locked_until = None;
        }
        Ok(state)
    }
}

#[derive(Default)]
struct ConversationState {
    next_conversation_id: i64,
    next_message_id: i64,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

#[derive(Default)]
pub struct FakeConversationRepository {
    state: Mutex<ConversationState>,
}

#[async_trait]
impl ConversationRepository for FakeConversationRepository {
    async fn get_or_create(
        &self,
        a_id: i64,
        b_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Conversation, bool)> {
        let mut state = self.state.lock().unwrap();
        let (lo, hi) = (a_id.min(b_id), a_id.max(b_id));
        if let Some(existing) = state
            .conversations
            .iter()
            .find(|c| c.initiator_id.min(c.peer_id) == lo && c.initiator_id.max(c.peer_id) == hi)
        {
            return Ok((existing.clone(), false));
        }
        state.next_conversation_id += 1;
        let conversation = Conversation {
            id: state.next_conversation_id,
            initiator_id: a_id,
            peer_id: b_id,
            created_at: now,
            updated_at: now,
        };
        state.conversations.push(conversation.clone());
        Ok((conversation, true))
    }

    async fn get(&self, conversation_id: i64) -> Result<Option<Conversation>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned())
    }

    async fn insert_message(&self, message: NewMessage, now: DateTime<Utc>) -> Result<Message> {
        let mut state = self.state.lock().unwrap();
        state.next_message_id += 1;
        let stored = Message {
            id: state.next_message_id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            attachment_path: message.attachment_path,
            voice_duration_secs: message.voice_duration_secs,
            created_at: now,
            is_read: false,
            is_deleted: false,
        };
        state.messages.push(stored.clone());
        if let Some(conversation) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        {
            conversation.updated_at = now;
        }
        Ok(stored)
    }

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn fetch_and_mark_read(
        &self,
        conversation_id: i64,
        viewer_id: i64,
        filter: MessageFilter,
        since_message_id: Option<i64>,
    ) -> Result<(Vec<Message>, u64)> {
        let mut state = self.state.lock().unwrap();
        let mut selected: Vec<usize> = state
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                m.conversation_id == conversation_id
                    && !m.is_deleted
                    && since_message_id.is_none_or(|since| m.id > since)
                    && match filter {
                        MessageFilter::All => true,
                        MessageFilter::UnreadOnly => !m.is_read && m.sender_id != viewer_id,
                    }
            })
            .map(|(idx, _)| idx)
            .collect();
        selected.sort_by_key(|&idx| {
            let m = &state.messages[idx];
            (m.created_at, m.id)
        });

        let mut marked = 0u64;
        let mut result = Vec::with_capacity(selected.len());
        for idx in selected {
            let message = &mut state.messages[idx];
            if message.sender_id != viewer_id && !message.is_read {
                message.is_read = true;
                marked += 1;
            }
            result.push(message.clone());
        }
        Ok((result, marked))
    }

    async fn mark_all_read(&self, conversation_id: i64, viewer_id: i64) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let mut marked = 0u64;
        for message in state.messages.iter_mut() {
            if message.conversation_id == conversation_id
                && message.sender_id != viewer_id
                && !message.is_read
                && !message.is_deleted
            {
                message.is_read = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn mark_message_read(&self, message_id: i64, viewer_id: i64) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        for message in state.messages.iter_mut() {
            if message.id == message_id && message.sender_id != viewer_id && !message.is_read {
                message.is_read = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn soft_delete_message(&self, message_id: i64, sender_id: i64) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        for message in state.messages.iter_mut() {
            if message.id == message_id && message.sender_id == sender_id && !message.is_deleted {
                message.is_deleted = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn unread_count(&self, conversation_id: i64, viewer_id: i64) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| {
                m.conversation_id == conversation_id
                    && m.sender_id != viewer_id
                    && !m.is_read
                    && !m.is_deleted
            })
            .count() as i64)
    }

    async fn global_unread_count(&self, viewer_id: i64) -> Result<i64> {
        let state = self.state.lock().unwrap();
        let participating: Vec<i64> = state
            .conversations
            .iter()
            .filter(|c| c.involves(viewer_id))
            .map(|c| c.id)
            .collect();
        Ok(state
            .messages
            .iter()
            .filter(|m| {
                participating.contains(&m.conversation_id)
                    && m.sender_id != viewer_id
                    && !m.is_read
                    && !m.is_deleted
            })
            .count() as i64)
    }
}

#[derive(Default)]
pub struct FakeActivityRepository {
    counters: Mutex<HashMap<(i64, NaiveDate, &'static str), i64>>,
}

impl FakeActivityRepository {
    pub fn total(&self, user_id: i64, kind: ActivityKind) -> i64 {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .filter(|((uid, _, column), _)| *uid == user_id && *column == kind.as_column())
            .map(|(_, amount)| *amount)
            .sum()
    }
}

#[async_trait]
impl ActivityRepository for FakeActivityRepository {
    async fn bump(
        &self,
        user_id: i64,
        day: NaiveDate,
        kind: ActivityKind,
        amount: i64,
    ) -> Result<()> {
        *self
            .counters
            .lock()
            .unwrap()
            .entry((user_id, day, kind.as_column()))
            .or_insert(0) += amount;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIdentityRepository {
    users: Mutex<HashMap<i64, UserRecord>>,
}

impl FakeIdentityRepository {
    pub fn add_user(&self, id: i64, username: &str, password_hash: &str) {
        self.users.lock().unwrap().insert(
            id,
            UserRecord {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
    }

    /// 不关心密码的测试用户
    pub fn add_plain_user(&self, id: i64, username: &str) {
        self.add_user(id, username, "");
    }
}

#[async_trait]
impl IdentityRepository for FakeIdentityRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn exists(&self, user_id: i64) -> Result<bool> {
        Ok(self.users.lock().unwrap().contains_key(&user_id))
    }
}

#[derive(Default)]
pub struct FakeMediaStore {
    stored: AtomicU64,
}

#[async_trait]
impl MediaStore for FakeMediaStore {
    async fn store_voice(&self, _payload: &[u8], _now: DateTime<Utc>) -> Result<String> {
        let n = self.stored.fetch_add(1, Ordering::SeqCst);
        Ok(format!("voice/fake-{n}.ogg"))
    }
}
