//! 数据模型模块
//! 权限目录、角色与用户角色分配

pub mod assignment;
pub mod permission;
pub mod role;

pub use assignment::*;
pub use permission::*;
pub use role::*;
