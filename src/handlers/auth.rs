//! 认证边界的 HTTP 处理器
//!
//! 登录与令牌签发由外部认证系统负责；这里只承接
//! 已认证会话的登出事件并写入审计轨迹。

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::{AppState, RequestContext},
    services::audit_service::AuditAction,
};
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

/// 登出：记录 LOGOUT 审计事件
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    request_context: RequestContext,
) -> Result<impl IntoResponse, AppError> {
    state
        .audit_service
        .log_auth(
            &request_context,
            Some(auth_context.user_id),
            AuditAction::Logout,
            json!({ "method": "logout" }),
        )
        .await?;

    Ok(Json(json!({
        "message": "Logged out"
    })))
}
