//! 查询对象：只读入口参数

#[derive(Clone, Debug)]
pub struct FetchMessages {
    pub conversation_id: i64,
    pub viewer_id: i64,
    pub unread_only: bool,
}

#[derive(Clone, Debug)]
pub struct PollNewMessages {
    pub conversation_id: i64,
    pub viewer_id: i64,
    pub last_message_id: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct ConversationUnreadCount {
    pub conversation_id: i64,
    pub viewer_id: i64,
}

#[derive(Clone, Debug)]
pub struct UserStatuses {
    pub user_ids: Vec<i64>,
}
