//! 审计日志的 HTTP 处理器（合规报告）

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::audit::AuditLogFilters,
    services::access_control_service::{AccessPermission, ResourceType},
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// 审计查询参数
#[derive(Debug, Deserialize)]
pub struct AuditLogListQuery {
    pub actor_user_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub action: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 列出审计日志（只读，分页）。矩阵只对管理员开放 audit_log 读取。
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(query): Query<AuditLogListQuery>,
) -> Result<impl IntoResponse, AppError> {
    state
        .access_control_service
        .require_permission(&auth_context, ResourceType::AuditLog, AccessPermission::Read)
        .into_result()?;

    let filters = AuditLogFilters {
        actor_user_id: query.actor_user_id,
        resource_type: query.resource_type,
        resource_id: query.resource_id,
        action: query.action,
        start_time: query.start_time,
        end_time: query.end_time,
    };

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let logs = state.audit_service.query_logs(&filters, limit, offset).await?;
    let total = state.audit_service.count_logs(&filters).await?;

    Ok(Json(json!({
        "logs": logs,
        "total": total,
        "limit": limit,
        "offset": offset
    })))
}

/// 触发保留期清理（部署方的定时任务调用）。
/// 幂等；删除行数与截止时间由一条系统审计条目记录。
pub async fn cleanup_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    state
        .access_control_service
        .require_permission(&auth_context, ResourceType::AuditLog, AccessPermission::Admin)
        .into_result()?;

    let deleted = state.audit_service.cleanup_old_logs().await?;

    Ok(Json(json!({
        "deleted_count": deleted
    })))
}
