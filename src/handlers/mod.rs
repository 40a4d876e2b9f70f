//! HTTP 处理器模块

pub mod assignments;
pub mod health;
pub mod me;
pub mod permissions;
pub mod roles;
