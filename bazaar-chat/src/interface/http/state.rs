//! 接口层共享状态

use std::sync::Arc;

use crate::application::{ChatCommandHandler, ChatQueryHandler};
use crate::domain::service::PresenceService;
use crate::infrastructure::auth::TokenCodec;

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<ChatCommandHandler>,
    pub queries: Arc<ChatQueryHandler>,
    pub presence: Arc<PresenceService>,
    pub tokens: Arc<TokenCodec>,
}
