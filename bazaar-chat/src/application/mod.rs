pub mod commands;
pub mod handlers;
pub mod queries;

pub use handlers::{ChatCommandHandler, ChatQueryHandler, LoginOutcome, PollResult};
