//! HTTP 中间件
//! 请求追踪与请求上下文（客户端 IP、User-Agent、会话）提取

use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// 应用状态
///
/// 服务在启动时显式构造一次，经 AppState 注入到每个请求，
/// 不存在隐藏的全局单例。Arc 包装使 Clone 成本只是指针拷贝。
#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::AppConfig,
    pub db: sqlx::PgPool,
    pub encryption_service: Arc<crate::services::EncryptionService>,
    pub audit_service: Arc<crate::services::AuditService>,
    pub access_control_service: Arc<crate::services::AccessControlService>,
    pub consent_service: Arc<crate::services::ConsentService>,
    pub jwt_service: Arc<crate::auth::jwt::JwtService>,
}

/// 请求上下文：审计记录需要的客户端信息。
/// 作为显式扩展值随请求传递，不修改框架的请求类型。
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub trace_id: String,
}

impl RequestContext {
    /// 系统内部操作（保留期清理等）使用的上下文
    pub fn system() -> Self {
        RequestContext {
            client_ip: "system".to_string(),
            user_agent: None,
            session_id: None,
            trace_id: Uuid::new_v4().to_string(),
        }
    }
}

// 实现 FromRequestParts 以便在 handler 中直接提取 RequestContext
impl<S> FromRequestParts<S> for RequestContext
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
            .get::<RequestContext>()
            .cloned()
            .ok_or(AppError::Internal)
    }
}

/// 请求上下文中间件
/// 从请求头与连接信息派生审计上下文并附加到请求扩展
pub async fn request_context_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let socket_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let context = RequestContext {
        client_ip: get_client_ip(
            req.headers(),
            state.config.security.trust_proxy,
            socket_addr,
        ),
        user_agent: header_value(req.headers(), "user-agent"),
        session_id: header_value(req.headers(), "x-session-id"),
        trace_id: extract_or_generate_trace_id(req.headers()),
    };

    req.extensions_mut().insert(context);

    next.run(req).await
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().to_string();
    let uri = req.uri().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();

        let response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        metrics::counter!("http_requests_total").increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            method = %method,
            uri = %uri,
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request completed"
        );

        let mut response = response;
        if let Ok(value) = trace_id.parse() {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = request_id.parse() {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// 获取客户端 IP 地址
/// 信任代理时取 X-Forwarded-For 的第一跳，否则用连接的对端地址
pub fn get_client_ip(
    headers: &HeaderMap,
    trust_proxy: bool,
    socket_addr: Option<String>,
) -> String {
    if trust_proxy {
        if let Some(forwarded_for) = headers.get("x-forwarded-for") {
            if let Ok(forwarded_str) = forwarded_for.to_str() {
                // X-Forwarded-For 可能包含多个 IP，取第一个
                if let Some(first_ip) = forwarded_str.split(',').next() {
                    let first_ip = first_ip.trim();
                    if !first_ip.is_empty() {
                        return first_ip.to_string();
                    }
                }
            }
        }

        if let Some(real_ip) = headers.get("x-real-ip") {
            if let Ok(ip_str) = real_ip.to_str() {
                return ip_str.to_string();
            }
        }
    }

    socket_addr.unwrap_or_else(|| "unknown".to_string())
}
