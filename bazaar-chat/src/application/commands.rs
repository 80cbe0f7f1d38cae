//! 命令对象：所有会改变状态的入口参数

use crate::domain::model::PresenceAction;

#[derive(Clone, Debug)]
pub struct TouchPresence {
    pub user_id: i64,
    pub action: PresenceAction,
}

#[derive(Clone, Debug)]
pub struct Login {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Logout {
    pub user_id: i64,
}

#[derive(Clone, Debug)]
pub struct OpenConversation {
    pub initiator_id: i64,
    pub peer_user_id: i64,
}

#[derive(Clone, Debug)]
pub struct PostMessage {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct PostVoiceMessage {
    pub conversation_id: i64,
    pub sender_id: i64,
    pub payload: Vec<u8>,
    pub duration_secs: i32,
}

#[derive(Clone, Debug)]
pub struct MarkConversationRead {
    pub conversation_id: i64,
    pub viewer_id: i64,
}

#[derive(Clone, Debug)]
pub struct MarkMessageRead {
    pub message_id: i64,
    pub viewer_id: i64,
}

#[derive(Clone, Debug)]
pub struct DeleteMessage {
    pub message_id: i64,
    pub requester_id: i64,
}

#[derive(Clone, Debug)]
pub struct NotifyTyping {
    pub conversation_id: i64,
    pub user_id: i64,
}
