//! 审计日志服务
//!
//! 每次 PHI 访问/变更和认证事件的不可变加密审计轨迹。
//! 负载用系统审计盐加密（而非行为人的 PHI 盐），
//! 审计记录的可解密性与任何单个用户的密钥生命周期无关。

use crate::{
    config::AppConfig,
    error::AppError,
    middleware::RequestContext,
    models::audit::{ActorType, AuditEntry, AuditLogFilters},
    repository::{audit_repo::AuditRepository, secret_repo::SecretRepository},
    services::encryption_service::EncryptionService,
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// 系统审计盐在 system_secrets 表中的键
pub const AUDIT_SALT_KEY: &str = "audit_encryption_salt";

/// 盐的最小可接受长度；更短视为损坏，初始化失败
const MIN_AUDIT_SALT_LEN: usize = 16;

/// user_agent 截断长度（字符）
const MAX_USER_AGENT_CHARS: usize = 500;

/// 审计操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Export,
    Login,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Read => "READ",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Export => "EXPORT",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
        }
    }
}

/// 审计事件参数结构体
#[derive(Debug, Clone, Default)]
pub struct AuditEventParams {
    pub actor_user_id: Option<Uuid>,
    pub actor_type: Option<ActorType>,
    pub resource_id: Option<Uuid>,
    /// 变更前的值；JSON 序列化后加密，明文绝不落库
    pub previous_value: Option<serde_json::Value>,
    /// 变更后的值；同上
    pub new_value: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

pub struct AuditService {
    db: sqlx::PgPool,
    encryption: Arc<EncryptionService>,
    audit_salt: String,
    fail_closed: bool,
    retention_days: i64,
}

impl AuditService {
    /// 进程启动时调用一次：取回或创建系统审计盐。
    /// 盐缺失或过短是致命错误——每个 PHI 操作都依赖审计可用，
    /// 初始化失败时进程不得启动。
    pub async fn initialize(
        db: sqlx::PgPool,
        encryption: Arc<EncryptionService>,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        let repo = SecretRepository::new(db.clone());

        // 并发首次使用的竞争由唯一约束收敛，落败方重读赢家的值
        let candidate = EncryptionService::generate_user_salt();
        let secret = repo.get_or_create(AUDIT_SALT_KEY, &candidate).await?;

        if secret.value.len() < MIN_AUDIT_SALT_LEN {
            return Err(AppError::Config(
                "audit encryption salt is missing or too short".to_string(),
            ));
        }

        tracing::info!("Audit log service initialized");

        Ok(Self::new(
            db,
            encryption,
            secret.value,
            config.audit.fail_closed,
            config.audit.retention_days,
        ))
    }

    /// 显式构造（initialize 和测试使用）
    pub fn new(
        db: sqlx::PgPool,
        encryption: Arc<EncryptionService>,
        audit_salt: String,
        fail_closed: bool,
        retention_days: i64,
    ) -> Self {
        Self {
            db,
            encryption,
            audit_salt,
            fail_closed,
            retention_days,
        }
    }

    /// 核心记录原语，所有 log_* 构建器都收敛到这里。
    ///
    /// 失败策略：持久化失败被捕获，通过 CRITICAL 日志 + 指标旁路上报。
    /// fail_closed=false 时不向触发的业务操作传播（尽力而为）；
    /// fail_closed=true 时以 AuditPersistence 拒绝业务操作（合规优先）。
    pub async fn log(
        &self,
        context: &RequestContext,
        action: AuditAction,
        resource_type: &str,
        params: AuditEventParams,
    ) -> Result<(), AppError> {
        let actor_type = params.actor_type.unwrap_or(if params.actor_user_id.is_some() {
            ActorType::User
        } else {
            ActorType::Anonymous
        });

        let result = self.persist(context, action, resource_type, actor_type, &params).await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                // CRITICAL 旁路：永不静默丢弃一条合规记录的事实
                tracing::error!(
                    severity = "CRITICAL",
                    action = action.as_str(),
                    resource_type = resource_type,
                    error = %e,
                    "Audit record could not be persisted"
                );
                metrics::counter!("audit_persist_failures_total").increment(1);

                if self.fail_closed {
                    Err(AppError::AuditPersistence)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn persist(
        &self,
        context: &RequestContext,
        action: AuditAction,
        resource_type: &str,
        actor_type: ActorType,
        params: &AuditEventParams,
    ) -> Result<(), AppError> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            actor_user_id: params.actor_user_id,
            actor_type,
            action: action.as_str().to_string(),
            resource_type: resource_type.to_string(),
            resource_id: params.resource_id,
            previous_value_ciphertext: self.encrypt_value(params.previous_value.as_ref())?,
            new_value_ciphertext: self.encrypt_value(params.new_value.as_ref())?,
            ip_address: context.client_ip.clone(),
            user_agent: context
                .user_agent
                .as_ref()
                .map(|ua| ua.chars().take(MAX_USER_AGENT_CHARS).collect()),
            session_id: context.session_id.clone(),
            metadata: params.metadata.clone().unwrap_or_else(|| json!({})),
            created_at: Utc::now(),
        };

        let repo = AuditRepository::new(self.db.clone());
        repo.insert_entry(&entry).await
    }

    /// 用系统审计盐加密负载。字符串直接加密，其他 JSON 值先序列化。
    fn encrypt_value(
        &self,
        value: Option<&serde_json::Value>,
    ) -> Result<Option<String>, AppError> {
        let plaintext = match value {
            None => return Ok(None),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string(other).map_err(|e| {
                tracing::error!("Failed to serialize audit payload: {}", e);
                AppError::Internal
            })?,
        };

        Ok(Some(self.encryption.encrypt(&plaintext, &self.audit_salt)?))
    }

    // ==================== 构建器 ====================

    /// PHI 读取事件
    pub async fn log_access(
        &self,
        context: &RequestContext,
        actor_user_id: Uuid,
        resource_type: &str,
        resource_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        self.log(
            context,
            AuditAction::Read,
            resource_type,
            AuditEventParams {
                actor_user_id: Some(actor_user_id),
                resource_id,
                ..Default::default()
            },
        )
        .await
    }

    /// 创建事件，记录新值密文
    pub async fn log_create(
        &self,
        context: &RequestContext,
        actor_user_id: Uuid,
        resource_type: &str,
        resource_id: Option<Uuid>,
        new_value: serde_json::Value,
    ) -> Result<(), AppError> {
        self.log(
            context,
            AuditAction::Create,
            resource_type,
            AuditEventParams {
                actor_user_id: Some(actor_user_id),
                resource_id,
                new_value: Some(new_value),
                ..Default::default()
            },
        )
        .await
    }

    /// 更新事件，记录前后值密文
    pub async fn log_update(
        &self,
        context: &RequestContext,
        actor_user_id: Uuid,
        resource_type: &str,
        resource_id: Option<Uuid>,
        previous_value: serde_json::Value,
        new_value: serde_json::Value,
    ) -> Result<(), AppError> {
        self.log(
            context,
            AuditAction::Update,
            resource_type,
            AuditEventParams {
                actor_user_id: Some(actor_user_id),
                resource_id,
                previous_value: Some(previous_value),
                new_value: Some(new_value),
                ..Default::default()
            },
        )
        .await
    }

    /// 删除事件。调用方必须在数据操作之前记录（删除后旧值不可再取）。
    pub async fn log_delete(
        &self,
        context: &RequestContext,
        actor_user_id: Uuid,
        resource_type: &str,
        resource_id: Option<Uuid>,
        previous_value: serde_json::Value,
    ) -> Result<(), AppError> {
        self.log(
            context,
            AuditAction::Delete,
            resource_type,
            AuditEventParams {
                actor_user_id: Some(actor_user_id),
                resource_id,
                previous_value: Some(previous_value),
                ..Default::default()
            },
        )
        .await
    }

    /// 导出事件。只记录数量等元数据，不记录原始 PHI。
    pub async fn log_export(
        &self,
        context: &RequestContext,
        actor_user_id: Uuid,
        resource_type: &str,
        metadata: serde_json::Value,
    ) -> Result<(), AppError> {
        self.log(
            context,
            AuditAction::Export,
            resource_type,
            AuditEventParams {
                actor_user_id: Some(actor_user_id),
                metadata: Some(metadata),
                ..Default::default()
            },
        )
        .await
    }

    /// 认证事件（登录/登出）。失败的登录没有已认证主体，actor 为 None。
    pub async fn log_auth(
        &self,
        context: &RequestContext,
        actor_user_id: Option<Uuid>,
        action: AuditAction,
        metadata: serde_json::Value,
    ) -> Result<(), AppError> {
        debug_assert!(matches!(action, AuditAction::Login | AuditAction::Logout));
        self.log(
            context,
            action,
            "auth",
            AuditEventParams {
                actor_user_id,
                metadata: Some(metadata),
                ..Default::default()
            },
        )
        .await
    }

    /// 系统事件（无请求上下文，行为主体是系统本身）
    pub async fn log_system(
        &self,
        action: AuditAction,
        resource_type: &str,
        metadata: serde_json::Value,
    ) -> Result<(), AppError> {
        let context = RequestContext::system();
        self.log(
            &context,
            action,
            resource_type,
            AuditEventParams {
                actor_type: Some(ActorType::System),
                metadata: Some(metadata),
                ..Default::default()
            },
        )
        .await
    }

    // ==================== 保留期与查询 ====================

    /// 删除早于保留期的日志并记录一条系统审计条目。
    /// 幂等：紧接着的第二次调用删除 0 行。
    pub async fn cleanup_old_logs(&self) -> Result<u64, AppError> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);

        let repo = AuditRepository::new(self.db.clone());
        let deleted = repo.delete_older_than(cutoff).await?;

        self.log_system(
            AuditAction::Delete,
            "audit_log",
            json!({
                "deleted_count": deleted,
                "cutoff_date": cutoff,
            }),
        )
        .await?;

        tracing::info!(
            deleted_count = deleted,
            cutoff = %cutoff,
            "Audit retention cleanup completed"
        );

        Ok(deleted)
    }

    /// 合规报告查询。只读，分页，绝不修改。
    pub async fn query_logs(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEntry>, AppError> {
        let repo = AuditRepository::new(self.db.clone());
        repo.query_entries(filters, limit, offset).await
    }

    /// 查询审计日志数量
    pub async fn count_logs(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        let repo = AuditRepository::new(self.db.clone());
        repo.count_entries(filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service(fail_closed: bool) -> AuditService {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost:1/unreachable")
            .unwrap();
        AuditService::new(
            pool,
            Arc::new(EncryptionService::new([3u8; 32])),
            EncryptionService::generate_user_salt(),
            fail_closed,
            2555,
        )
    }

    #[test]
    fn test_audit_action_strings() {
        assert_eq!(AuditAction::Create.as_str(), "CREATE");
        assert_eq!(AuditAction::Read.as_str(), "READ");
        assert_eq!(AuditAction::Update.as_str(), "UPDATE");
        assert_eq!(AuditAction::Delete.as_str(), "DELETE");
        assert_eq!(AuditAction::Export.as_str(), "EXPORT");
        assert_eq!(AuditAction::Login.as_str(), "LOGIN");
        assert_eq!(AuditAction::Logout.as_str(), "LOGOUT");
    }

    #[tokio::test]
    async fn test_encrypt_value_never_stores_cleartext() {
        let svc = test_service(false);

        let value = json!({"glucose": 5.4, "unit": "mmol/L"});
        let ciphertext = svc.encrypt_value(Some(&value)).unwrap().unwrap();

        assert!(!ciphertext.contains("glucose"));
        assert!(!ciphertext.contains("5.4"));

        // 用系统盐可独立解回
        let plaintext = svc.encryption.decrypt(&ciphertext, &svc.audit_salt).unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&plaintext).unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn test_encrypt_value_passes_strings_through_unserialized() {
        let svc = test_service(false);

        let value = serde_json::Value::String("already a string".to_string());
        let ciphertext = svc.encrypt_value(Some(&value)).unwrap().unwrap();
        let plaintext = svc.encryption.decrypt(&ciphertext, &svc.audit_salt).unwrap();

        // 字符串不经过二次 JSON 序列化（没有引号包裹）
        assert_eq!(plaintext, "already a string");
    }

    #[tokio::test]
    async fn test_encrypt_value_none_is_none() {
        let svc = test_service(false);
        assert!(svc.encrypt_value(None).unwrap().is_none());
    }
}
