//! 授权关系生命周期服务
//!
//! PENDING →(患者批准)→ ACTIVE →(患者撤销)→ REVOKED；
//! PENDING →(患者拒绝)→ 记录删除。
//! 每次状态迁移都写审计日志。撤销后的记录为合规目的永久保留。

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::RequestContext,
    models::consent::{ConsentCapabilities, ConsentRelationship, ConsentStatus},
    repository::{consent_repo::ConsentRepository, user_repo::UserRepository},
    services::audit_service::AuditService,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub struct ConsentService {
    db: sqlx::PgPool,
    audit: Arc<AuditService>,
}

impl ConsentService {
    pub fn new(db: sqlx::PgPool, audit: Arc<AuditService>) -> Self {
        Self { db, audit }
    }

    /// 提供者向患者发起授权请求，创建 PENDING 关系。
    /// (提供者, 患者) 对唯一；已存在任何状态的关系时拒绝重复创建。
    pub async fn request(
        &self,
        context: &RequestContext,
        provider: &AuthContext,
        patient_id: Uuid,
        capabilities: &ConsentCapabilities,
    ) -> Result<ConsentRelationship, AppError> {
        if patient_id == provider.user_id {
            return Err(AppError::BadRequest(
                "Cannot request consent for yourself".to_string(),
            ));
        }

        let user_repo = UserRepository::new(self.db.clone());
        if user_repo.find_by_id(&patient_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        let repo = ConsentRepository::new(self.db.clone());
        if repo.find_by_pair(provider.user_id, patient_id).await?.is_some() {
            return Err(AppError::BadRequest(
                "A consent relationship already exists for this patient".to_string(),
            ));
        }

        let rel = repo.create_pending(provider.user_id, patient_id, capabilities).await?;

        self.audit
            .log_create(
                context,
                provider.user_id,
                "consent",
                Some(rel.id),
                json!({ "status": "pending", "patient_id": patient_id }),
            )
            .await?;

        Ok(rel)
    }

    /// 患者批准 PENDING 请求，关系进入 ACTIVE。
    /// 过期时间可选；不设置则有效直到撤销。
    pub async fn approve(
        &self,
        context: &RequestContext,
        patient: &AuthContext,
        consent_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ConsentRelationship, AppError> {
        let repo = ConsentRepository::new(self.db.clone());
        let rel = self.load_own_relationship(&repo, patient, consent_id).await?;

        if rel.status != ConsentStatus::Pending {
            return Err(AppError::BadRequest(
                "Only pending consent requests can be approved".to_string(),
            ));
        }

        let updated = repo
            .update_status(rel.id, ConsentStatus::Active, Some(Utc::now()), expires_at)
            .await?
            .ok_or(AppError::NotFound)?;

        self.audit
            .log_update(
                context,
                patient.user_id,
                "consent",
                Some(rel.id),
                json!({ "status": "pending" }),
                json!({ "status": "active", "expires_at": expires_at }),
            )
            .await?;

        Ok(updated)
    }

    /// 患者拒绝 PENDING 请求，记录被删除
    pub async fn deny(
        &self,
        context: &RequestContext,
        patient: &AuthContext,
        consent_id: Uuid,
    ) -> Result<(), AppError> {
        let repo = ConsentRepository::new(self.db.clone());
        let rel = self.load_own_relationship(&repo, patient, consent_id).await?;

        if rel.status != ConsentStatus::Pending {
            return Err(AppError::BadRequest(
                "Only pending consent requests can be denied".to_string(),
            ));
        }

        // 删除操作：先写审计，再删数据
        self.audit
            .log_delete(
                context,
                patient.user_id,
                "consent",
                Some(rel.id),
                json!({ "status": "pending", "provider_id": rel.provider_id }),
            )
            .await?;

        repo.delete(rel.id).await?;

        Ok(())
    }

    /// 患者撤销 ACTIVE 授权。记录保留为 REVOKED，永不删除。
    pub async fn revoke(
        &self,
        context: &RequestContext,
        patient: &AuthContext,
        consent_id: Uuid,
    ) -> Result<ConsentRelationship, AppError> {
        let repo = ConsentRepository::new(self.db.clone());
        let rel = self.load_own_relationship(&repo, patient, consent_id).await?;

        if rel.status != ConsentStatus::Active {
            return Err(AppError::BadRequest(
                "Only active consent relationships can be revoked".to_string(),
            ));
        }

        let updated = repo
            .update_status(rel.id, ConsentStatus::Revoked, None, None)
            .await?
            .ok_or(AppError::NotFound)?;

        self.audit
            .log_update(
                context,
                patient.user_id,
                "consent",
                Some(rel.id),
                json!({ "status": "active" }),
                json!({ "status": "revoked" }),
            )
            .await?;

        Ok(updated)
    }

    /// 加载关系并校验属于该患者。
    /// 不存在与不属于调用者一律返回 404，不向外确认他人记录的存在。
    async fn load_own_relationship(
        &self,
        repo: &ConsentRepository,
        patient: &AuthContext,
        consent_id: Uuid,
    ) -> Result<ConsentRelationship, AppError> {
        let rel = repo.find_by_id(consent_id).await?.ok_or(AppError::NotFound)?;

        if rel.patient_id != patient.user_id {
            tracing::warn!(
                consent_id = %consent_id,
                "Consent transition attempted by non-owning user"
            );
            return Err(AppError::NotFound);
        }

        Ok(rel)
    }
}
