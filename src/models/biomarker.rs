//! Biomarker domain models
//!
//! 数值属于 PHI，数据库中仅存储密文；数值与字符串的转换发生在 handler 层。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Biomarker row（value 只有密文列）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Biomarker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub biomarker_type: String,
    #[serde(skip_serializing)]
    pub value_ciphertext: String,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create biomarker request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBiomarkerRequest {
    /// 目标用户；缺省为调用者自己的数据
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub biomarker_type: String,
    pub value: f64,
    #[validate(length(max = 32))]
    pub unit: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Update biomarker request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBiomarkerRequest {
    pub value: Option<f64>,
    #[validate(length(max = 32))]
    pub unit: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// 列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct BiomarkerListQuery {
    /// 目标用户（提供者代表患者查询时使用）
    pub user_id: Option<Uuid>,
    pub biomarker_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Biomarker response（明文数值只出现在已授权的响应里）
#[derive(Debug, Clone, Serialize)]
pub struct BiomarkerResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub biomarker_type: String,
    pub value: f64,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
