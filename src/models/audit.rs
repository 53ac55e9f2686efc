//! Audit domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 审计行为主体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "actor_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    System,
    Anonymous,
}

/// Audit log entry (append-only)
///
/// previous/new value 只以密文存储，使用系统审计盐加密，
/// 与任何单个用户的 PHI 密钥生命周期无关。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub previous_value_ciphertext: Option<String>,
    pub new_value_ciphertext: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Audit log filters
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogFilters {
    pub actor_user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub action: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// 系统密钥行（审计加密盐等），key 唯一
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SystemSecret {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}
