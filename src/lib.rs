//! 教练平台授权服务
//! 权限目录、角色继承、用户角色分配与授权判定

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod seed;
pub mod services;
pub mod telemetry;
