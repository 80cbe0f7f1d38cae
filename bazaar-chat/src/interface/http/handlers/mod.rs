//! HTTP 处理器

pub mod auth;
pub mod conversations;
pub mod messages;
pub mod presence;
pub mod system;

use serde::Serialize;

use crate::domain::model::Message;

/// 消息的对外 JSON 视图
#[derive(Serialize)]
pub struct MessageView {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub voice_duration_secs: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub is_read: bool,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            attachment: message.attachment_path.clone(),
            voice_duration_secs: message.voice_duration_secs,
            created_at: message.created_at,
            is_read: message.is_read,
        }
    }
}

pub fn message_views(messages: &[Message]) -> Vec<MessageView> {
    messages.iter().map(MessageView::from).collect()
}
