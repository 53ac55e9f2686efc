//! 数据模型模块
//! 用户、授权关系、审计日志与代表性 PHI 资源

pub mod audit;
pub mod biomarker;
pub mod consent;
pub mod user;
