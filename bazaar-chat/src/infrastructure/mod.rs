pub mod auth;
pub mod media;
pub mod persistence;
pub mod typing;
