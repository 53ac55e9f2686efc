//! JWT 认证中间件
//!
//! 验证访问令牌后从数据库加载主体，停用账户一律拒绝。
//! 角色以数据库行为准（请求期间不可变），不信任令牌声明里的角色。

use crate::{
    error::AppError, middleware::AppState, models::user::Role,
    repository::user_repo::UserRepository,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

/// 认证上下文（附加到请求扩展）
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 从 Authorization 头提取令牌
pub fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .ok_or(AppError::Unauthorized)
}

/// JWT 认证中间件 - 必须认证
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 从 Authorization 头提取并验证令牌
    let token = extract_token(req.headers())?;
    let claims = state.jwt_service.validate_access_token(&token)?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

    // 主体必须存在且处于激活状态
    let repo = UserRepository::new(state.db.clone());
    let user = repo
        .find_by_id(&user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.is_active {
        tracing::warn!(user_id = %user_id, "Deactivated account attempted access");
        return Err(AppError::Unauthorized);
    }

    let auth_context = AuthContext {
        user_id: user.id,
        role: user.role,
    };

    // 附加到请求扩展
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}
