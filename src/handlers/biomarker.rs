//! 生物标志物的 HTTP 处理器（代表性 PHI 资源）
//!
//! 数值只以密文落库，用数据所有者的盐加密。
//! 列表/创建走 require_resource_access（目标所有者从请求解析），
//! 单条路由先加载资源再走 require_ownership。
//! 读取与变更旁路写审计，删除先写审计再删数据。

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::{AppState, RequestContext},
    models::biomarker::*,
    repository::{biomarker_repo::BiomarkerRepository, user_repo::UserRepository},
    services::access_control_service::{resolve_target_owner, AccessPermission, ResourceType},
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// 解密并解析一条记录为响应 DTO
fn decrypt_response(
    state: &AppState,
    biomarker: &Biomarker,
    salt: &str,
) -> Result<BiomarkerResponse, AppError> {
    let plaintext = state
        .encryption_service
        .decrypt(&biomarker.value_ciphertext, salt)?;
    // 数值 PHI 以规范字符串形式加密，解析发生在这里而不是加密层
    let value = plaintext.parse::<f64>().map_err(|_| {
        tracing::error!(biomarker_id = %biomarker.id, "Decrypted biomarker value is not numeric");
        AppError::Internal
    })?;

    Ok(BiomarkerResponse {
        id: biomarker.id,
        user_id: biomarker.user_id,
        biomarker_type: biomarker.biomarker_type.clone(),
        value,
        unit: biomarker.unit.clone(),
        recorded_at: biomarker.recorded_at,
        created_at: biomarker.created_at,
    })
}

async fn owner_salt(state: &AppState, owner_id: &Uuid) -> Result<String, AppError> {
    UserRepository::new(state.db.clone())
        .find_encryption_salt(owner_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// 列出生物标志物
pub async fn list_biomarkers(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Query(query): Query<BiomarkerListQuery>,
) -> Result<impl IntoResponse, AppError> {
    // 目标所有者：查询参数，缺省为调用者自己
    let target = resolve_target_owner(None, query.user_id, None);

    state
        .access_control_service
        .require_resource_access(
            &auth_context,
            ResourceType::Biomarker,
            AccessPermission::Read,
            target,
        )
        .await?
        .into_result()?;

    let scope = state.access_control_service.enforce_user_scope(&auth_context, target);
    let owner = target.unwrap_or(auth_context.user_id);
    let salt = owner_salt(&state, &owner).await?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let repo = BiomarkerRepository::new(state.db.clone());
    let biomarkers = repo
        .list_for_user(owner, query.biomarker_type.as_deref(), limit, offset)
        .await?;

    let responses: Vec<BiomarkerResponse> = biomarkers
        .iter()
        .map(|b| decrypt_response(&state, b, &salt))
        .collect::<Result<_, _>>()?;

    state
        .audit_service
        .log_access(&request_context, auth_context.user_id, "biomarker", None)
        .await?;

    Ok(Json(json!({
        "biomarkers": responses,
        "count": responses.len(),
        "scope": scope
    })))
}

/// 创建生物标志物
pub async fn create_biomarker(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Json(req): Json<CreateBiomarkerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    // 目标所有者：请求体，缺省为调用者自己
    let target = resolve_target_owner(None, None, req.user_id);

    state
        .access_control_service
        .require_resource_access(
            &auth_context,
            ResourceType::Biomarker,
            AccessPermission::Write,
            target,
        )
        .await?
        .into_result()?;

    let owner = target.unwrap_or(auth_context.user_id);
    let salt = owner_salt(&state, &owner).await?;

    // 数值 PHI 以规范字符串形式加密
    let canonical_value = req.value.to_string();
    let ciphertext = state.encryption_service.encrypt(&canonical_value, &salt)?;

    let repo = BiomarkerRepository::new(state.db.clone());
    let biomarker = repo
        .create(
            owner,
            &req.biomarker_type,
            &ciphertext,
            req.unit.as_deref(),
            req.recorded_at.unwrap_or_else(Utc::now),
        )
        .await?;

    state
        .audit_service
        .log_create(
            &request_context,
            auth_context.user_id,
            "biomarker",
            Some(biomarker.id),
            json!({
                "biomarker_type": req.biomarker_type,
                "value": canonical_value,
                "unit": req.unit,
            }),
        )
        .await?;

    let response = decrypt_response(&state, &biomarker, &salt)?;

    Ok(Json(json!({
        "message": "Biomarker created",
        "biomarker": response
    })))
}

/// 获取单条生物标志物
pub async fn get_biomarker(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let repo = BiomarkerRepository::new(state.db.clone());
    let biomarker = repo.find_by_id(id).await?.ok_or(AppError::NotFound)?;

    // 未授权方得到 404，不确认资源存在
    state
        .access_control_service
        .require_ownership(
            &auth_context,
            ResourceType::Biomarker,
            AccessPermission::Read,
            biomarker.user_id,
        )
        .await?
        .decision
        .into_result_defensive()?;

    let salt = owner_salt(&state, &biomarker.user_id).await?;
    let response = decrypt_response(&state, &biomarker, &salt)?;

    state
        .audit_service
        .log_access(&request_context, auth_context.user_id, "biomarker", Some(id))
        .await?;

    Ok(Json(response))
}

/// 更新生物标志物
pub async fn update_biomarker(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBiomarkerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let repo = BiomarkerRepository::new(state.db.clone());
    let existing = repo.find_by_id(id).await?.ok_or(AppError::NotFound)?;

    state
        .access_control_service
        .require_ownership(
            &auth_context,
            ResourceType::Biomarker,
            AccessPermission::Write,
            existing.user_id,
        )
        .await?
        .decision
        .into_result_defensive()?;

    let salt = owner_salt(&state, &existing.user_id).await?;
    let previous_value = state
        .encryption_service
        .decrypt(&existing.value_ciphertext, &salt)?;

    let new_ciphertext = match req.value {
        Some(value) => Some(state.encryption_service.encrypt(&value.to_string(), &salt)?),
        None => None,
    };

    let updated = repo
        .update(id, new_ciphertext.as_deref(), req.unit.as_deref(), req.recorded_at)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_value = state
        .encryption_service
        .decrypt(&updated.value_ciphertext, &salt)?;

    state
        .audit_service
        .log_update(
            &request_context,
            auth_context.user_id,
            "biomarker",
            Some(id),
            json!({ "value": previous_value, "unit": existing.unit }),
            json!({ "value": new_value, "unit": updated.unit }),
        )
        .await?;

    let response = decrypt_response(&state, &updated, &salt)?;

    Ok(Json(json!({
        "message": "Biomarker updated",
        "biomarker": response
    })))
}

/// 删除生物标志物。审计先于数据操作（删除后旧值不可再取）。
pub async fn delete_biomarker(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let repo = BiomarkerRepository::new(state.db.clone());
    let existing = repo.find_by_id(id).await?.ok_or(AppError::NotFound)?;

    state
        .access_control_service
        .require_ownership(
            &auth_context,
            ResourceType::Biomarker,
            AccessPermission::Delete,
            existing.user_id,
        )
        .await?
        .decision
        .into_result_defensive()?;

    let salt = owner_salt(&state, &existing.user_id).await?;
    let previous_value = state
        .encryption_service
        .decrypt(&existing.value_ciphertext, &salt)?;

    state
        .audit_service
        .log_delete(
            &request_context,
            auth_context.user_id,
            "biomarker",
            Some(id),
            json!({
                "biomarker_type": existing.biomarker_type,
                "value": previous_value,
                "unit": existing.unit,
            }),
        )
        .await?;

    repo.delete(id).await?;

    Ok(Json(json!({
        "message": "Biomarker deleted"
    })))
}

/// 导出生物标志物。审计只记录数量，不记录原始值。
pub async fn export_biomarkers(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Query(query): Query<BiomarkerListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let target = resolve_target_owner(None, query.user_id, None);

    state
        .access_control_service
        .require_resource_access(
            &auth_context,
            ResourceType::Biomarker,
            AccessPermission::Read,
            target,
        )
        .await?
        .into_result()?;

    let owner = target.unwrap_or(auth_context.user_id);
    let salt = owner_salt(&state, &owner).await?;

    let repo = BiomarkerRepository::new(state.db.clone());
    let biomarkers = repo
        .list_for_user(owner, query.biomarker_type.as_deref(), 10_000, 0)
        .await?;

    let responses: Vec<BiomarkerResponse> = biomarkers
        .iter()
        .map(|b| decrypt_response(&state, b, &salt))
        .collect::<Result<_, _>>()?;

    state
        .audit_service
        .log_export(
            &request_context,
            auth_context.user_id,
            "biomarker",
            json!({ "count": responses.len(), "target_user_id": owner }),
        )
        .await?;

    Ok(Json(json!({
        "biomarkers": responses,
        "count": responses.len()
    })))
}
