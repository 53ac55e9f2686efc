//! 健康档案系统主入口
//! 启动顺序：配置 → 日志 → 数据库 → 权限矩阵校验 → 加密/审计服务 → 路由

use phr_system::{
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    middleware::AppState,
    routes,
    services::{
        access_control_service::validate_permission_matrix, AccessControlService, AuditService,
        ConsentService, EncryptionService,
    },
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("phr-system {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 生产环境应该直接设置环境变量，不依赖 .env 文件
    if let Ok(path) = std::env::var("PHR_ENV") {
        dotenv::from_filename(format!(".env.{}", path)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置（主加密密钥缺失/格式错误在这里阻止启动）
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "PHR system starting...");

    // 3. 权限矩阵完整性校验：缺失条目阻止启动
    validate_permission_matrix()
        .map_err(|e| anyhow::anyhow!("Permission matrix validation failed: {}", e))?;

    // 4. 数据库连接池 + 迁移
    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    tracing::info!("Database initialized");

    // 5. 显式构造服务（启动一次，经 AppState 注入，没有全局单例）
    let encryption_service = Arc::new(EncryptionService::from_config(&config)?);

    // 审计初始化失败是致命的：每个 PHI 操作都依赖审计可用
    let audit_service = Arc::new(
        AuditService::initialize(db_pool.clone(), encryption_service.clone(), &config)
            .await
            .map_err(|e| anyhow::anyhow!("Audit log service initialization failed: {}", e))?,
    );

    let access_control_service = Arc::new(AccessControlService::new(db_pool.clone()));
    let consent_service = Arc::new(ConsentService::new(db_pool.clone(), audit_service.clone()));
    let jwt_service = Arc::new(JwtService::from_config(&config)?);

    let app_state = Arc::new(AppState {
        config: config.clone(),
        db: db_pool.clone(),
        encryption_service,
        audit_service,
        access_control_service,
        consent_service,
        jwt_service,
    });

    // 6. 构建路由
    let app = routes::create_router(app_state.clone());

    // 7. 启动服务器（带连接信息，审计需要对端地址回退）
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        "Server listening"
    );

    // 8. 优雅关闭
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.server.graceful_shutdown_timeout_secs))
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    // 超时后强制关闭
    tokio::time::sleep(tokio::time::Duration::from_secs(timeout_secs)).await;
    tracing::warn!("Graceful shutdown timeout reached, forcing exit");
}

/// 打印帮助信息
fn print_help() {
    println!("phr-system {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: phr-system [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过环境变量完成（前缀 PHR_）");
    println!("  必需: PHR_DATABASE__URL, PHR_SECURITY__MASTER_ENCRYPTION_KEY");
}
