//! Bazaar Chat 核心服务
//!
//! 游戏物品交易市场的聊天核心：在线状态跟踪、双人会话与消息读取、
//! 未读聚合以及登录失败锁定。对外暴露 HTTP/JSON 接口，存储使用 PostgreSQL。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod service;
