//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{handlers, middleware::AppState};

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 需要认证的路由
    let authenticated_routes = Router::new()
        // 认证边界（令牌签发在外部系统）
        .route("/api/v1/auth/logout", post(handlers::auth::logout))

        // 生物标志物（代表性 PHI 资源）
        .route(
            "/api/v1/biomarkers",
            get(handlers::biomarker::list_biomarkers)
                .post(handlers::biomarker::create_biomarker)
        )
        .route("/api/v1/biomarkers/export", get(handlers::biomarker::export_biomarkers))
        .route(
            "/api/v1/biomarkers/{id}",
            get(handlers::biomarker::get_biomarker)
                .put(handlers::biomarker::update_biomarker)
                .delete(handlers::biomarker::delete_biomarker)
        )

        // 授权关系生命周期
        .route(
            "/api/v1/consents",
            get(handlers::consent::list_consents)
                .post(handlers::consent::request_consent)
        )
        .route("/api/v1/consents/{id}/approve", post(handlers::consent::approve_consent))
        .route("/api/v1/consents/{id}/deny", post(handlers::consent::deny_consent))
        .route("/api/v1/consents/{id}/revoke", post(handlers::consent::revoke_consent))

        // 审计日志（合规报告，管理员）
        .route("/api/v1/audit/logs", get(handlers::audit::list_audit_logs))
        .route("/api/v1/audit/cleanup", post(handlers::audit::cleanup_audit_logs))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::middleware::jwt_auth_middleware,
        ));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::request_context_middleware,
        ))
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
