//! 健康档案系统库
//! PHI 保护与访问控制核心：字段级认证加密、不可变审计轨迹、分层授权

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
