//! Consent repository (授权关系数据访问)

use crate::{
    error::AppError,
    models::consent::{ConsentCapabilities, ConsentRelationship, ConsentStatus},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct ConsentRepository {
    db: PgPool,
}

impl ConsentRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 查找 (提供者, 患者) 对应的唯一关系
    pub async fn find_by_pair(
        &self,
        provider_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<ConsentRelationship>, AppError> {
        let rel = sqlx::query_as::<_, ConsentRelationship>(
            "SELECT * FROM consent_relationships WHERE provider_id = $1 AND patient_id = $2",
        )
        .bind(provider_id)
        .bind(patient_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(rel)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ConsentRelationship>, AppError> {
        let rel = sqlx::query_as::<_, ConsentRelationship>(
            "SELECT * FROM consent_relationships WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(rel)
    }

    /// 创建 PENDING 状态的授权请求；(provider, patient) 对已存在时违反唯一约束
    pub async fn create_pending(
        &self,
        provider_id: Uuid,
        patient_id: Uuid,
        capabilities: &ConsentCapabilities,
    ) -> Result<ConsentRelationship, AppError> {
        let rel = sqlx::query_as::<_, ConsentRelationship>(
            r#"
            INSERT INTO consent_relationships (
                id, provider_id, patient_id, status,
                view_biomarkers, view_insurance, view_dna, view_health_needs, edit_data
            )
            VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(provider_id)
        .bind(patient_id)
        .bind(capabilities.view_biomarkers)
        .bind(capabilities.view_insurance)
        .bind(capabilities.view_dna)
        .bind(capabilities.view_health_needs)
        .bind(capabilities.edit_data)
        .fetch_one(&self.db)
        .await?;

        Ok(rel)
    }

    /// 状态迁移（approve / revoke）。granted_at/expires_at 只在批准时写入。
    pub async fn update_status(
        &self,
        id: Uuid,
        status: ConsentStatus,
        granted_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ConsentRelationship>, AppError> {
        let rel = sqlx::query_as::<_, ConsentRelationship>(
            r#"
            UPDATE consent_relationships
            SET
                status = $2,
                consent_granted_at = COALESCE($3, consent_granted_at),
                consent_expires_at = COALESCE($4, consent_expires_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(granted_at)
        .bind(expires_at)
        .fetch_optional(&self.db)
        .await?;

        Ok(rel)
    }

    /// 删除记录。只用于患者拒绝 PENDING 请求；REVOKED 记录永不删除。
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM consent_relationships WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 列出与某个患者相关的关系
    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<ConsentRelationship>, AppError> {
        let rels = sqlx::query_as::<_, ConsentRelationship>(
            "SELECT * FROM consent_relationships WHERE patient_id = $1 ORDER BY created_at DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rels)
    }

    /// 列出与某个提供者相关的关系
    pub async fn list_for_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<ConsentRelationship>, AppError> {
        let rels = sqlx::query_as::<_, ConsentRelationship>(
            "SELECT * FROM consent_relationships WHERE provider_id = $1 ORDER BY created_at DESC",
        )
        .bind(provider_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rels)
    }
}
