//! Consent relationship domain models
//!
//! 患者授予提供者的、按能力范围限定且可设过期时间的访问授权。
//! 状态机：PENDING →(患者批准)→ ACTIVE →(患者撤销)→ REVOKED；
//! PENDING →(患者拒绝)→ 记录删除。REVOKED 记录为审计目的永久保留。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 授权状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "consent_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    Pending,
    Active,
    Revoked,
}

/// 授权能力标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentCapability {
    ViewBiomarkers,
    ViewInsurance,
    ViewDna,
    ViewHealthNeeds,
    EditData,
}

/// Consent relationship (unique per provider/patient pair)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConsentRelationship {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub status: ConsentStatus,
    pub view_biomarkers: bool,
    pub view_insurance: bool,
    pub view_dna: bool,
    pub view_health_needs: bool,
    pub edit_data: bool,
    pub consent_granted_at: Option<DateTime<Utc>>,
    pub consent_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsentRelationship {
    /// 在给定时间点授权是否生效：必须 ACTIVE 且未过期。
    /// 过期在检查时惰性判定，没有后台作业改写状态。
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != ConsentStatus::Active {
            return false;
        }
        match self.consent_expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }

    pub fn has_capability(&self, capability: ConsentCapability) -> bool {
        match capability {
            ConsentCapability::ViewBiomarkers => self.view_biomarkers,
            ConsentCapability::ViewInsurance => self.view_insurance,
            ConsentCapability::ViewDna => self.view_dna,
            ConsentCapability::ViewHealthNeeds => self.view_health_needs,
            ConsentCapability::EditData => self.edit_data,
        }
    }
}

/// 提供者请求的能力集合
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct ConsentCapabilities {
    #[serde(default)]
    pub view_biomarkers: bool,
    #[serde(default)]
    pub view_insurance: bool,
    #[serde(default)]
    pub view_dna: bool,
    #[serde(default)]
    pub view_health_needs: bool,
    #[serde(default)]
    pub edit_data: bool,
}

/// Request consent (provider -> patient)
#[derive(Debug, Deserialize)]
pub struct RequestConsentRequest {
    pub patient_id: Uuid,
    #[serde(default)]
    pub capabilities: ConsentCapabilities,
}

/// Approve consent (patient)
#[derive(Debug, Deserialize)]
pub struct ApproveConsentRequest {
    /// 可选的过期时间；不设置则长期有效，直到撤销
    pub consent_expires_at: Option<DateTime<Utc>>,
}

/// Consent response
#[derive(Debug, Clone, Serialize)]
pub struct ConsentResponse {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub status: ConsentStatus,
    pub view_biomarkers: bool,
    pub view_insurance: bool,
    pub view_dna: bool,
    pub view_health_needs: bool,
    pub edit_data: bool,
    pub consent_granted_at: Option<DateTime<Utc>>,
    pub consent_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ConsentRelationship> for ConsentResponse {
    fn from(rel: ConsentRelationship) -> Self {
        ConsentResponse {
            id: rel.id,
            provider_id: rel.provider_id,
            patient_id: rel.patient_id,
            status: rel.status,
            view_biomarkers: rel.view_biomarkers,
            view_insurance: rel.view_insurance,
            view_dna: rel.view_dna,
            view_health_needs: rel.view_health_needs,
            edit_data: rel.edit_data,
            consent_granted_at: rel.consent_granted_at,
            consent_expires_at: rel.consent_expires_at,
            created_at: rel.created_at,
        }
    }
}
