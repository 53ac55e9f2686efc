//! 授权关系的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::{AppState, RequestContext},
    models::consent::*,
    models::user::Role,
    repository::consent_repo::ConsentRepository,
    services::access_control_service::{AccessPermission, ResourceType},
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ConsentListQuery {
    /// 管理员按患者查询时使用
    pub user_id: Option<Uuid>,
}

/// 提供者发起授权请求（PENDING）
pub async fn request_consent(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Json(req): Json<RequestConsentRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .access_control_service
        .require_role(&auth_context, &[Role::Provider])
        .into_result()?;
    state
        .access_control_service
        .require_permission(&auth_context, ResourceType::Consent, AccessPermission::Write)
        .into_result()?;

    let rel = state
        .consent_service
        .request(&request_context, &auth_context, req.patient_id, &req.capabilities)
        .await?;

    Ok(Json(json!({
        "message": "Consent requested",
        "consent": ConsentResponse::from(rel)
    })))
}

/// 患者批准 PENDING 请求
pub async fn approve_consent(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ApproveConsentRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .access_control_service
        .require_role(&auth_context, &[Role::Patient])
        .into_result()?;

    let rel = state
        .consent_service
        .approve(&request_context, &auth_context, id, req.consent_expires_at)
        .await?;

    Ok(Json(json!({
        "message": "Consent approved",
        "consent": ConsentResponse::from(rel)
    })))
}

/// 患者拒绝 PENDING 请求，记录删除
pub async fn deny_consent(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .access_control_service
        .require_role(&auth_context, &[Role::Patient])
        .into_result()?;

    state
        .consent_service
        .deny(&request_context, &auth_context, id)
        .await?;

    Ok(Json(json!({
        "message": "Consent request denied"
    })))
}

/// 患者撤销 ACTIVE 授权，记录保留为 REVOKED
pub async fn revoke_consent(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .access_control_service
        .require_role(&auth_context, &[Role::Patient])
        .into_result()?;

    let rel = state
        .consent_service
        .revoke(&request_context, &auth_context, id)
        .await?;

    Ok(Json(json!({
        "message": "Consent revoked",
        "consent": ConsentResponse::from(rel)
    })))
}

/// 列出与调用者相关的授权关系
pub async fn list_consents(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(query): Query<ConsentListQuery>,
) -> Result<impl IntoResponse, AppError> {
    state
        .access_control_service
        .require_permission(&auth_context, ResourceType::Consent, AccessPermission::Read)
        .into_result()?;

    let repo = ConsentRepository::new(state.db.clone());

    let relationships = match auth_context.role {
        Role::Patient => repo.list_for_patient(auth_context.user_id).await?,
        Role::Provider => repo.list_for_provider(auth_context.user_id).await?,
        Role::Admin => {
            let patient_id = query.user_id.ok_or_else(|| {
                AppError::BadRequest("user_id query parameter is required".to_string())
            })?;
            repo.list_for_patient(patient_id).await?
        }
    };

    let responses: Vec<ConsentResponse> =
        relationships.into_iter().map(ConsentResponse::from).collect();

    Ok(Json(json!({
        "consents": responses,
        "count": responses.len()
    })))
}
