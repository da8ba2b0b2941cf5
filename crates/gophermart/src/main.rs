//! Gophermart 积分系统服务入口
//!
//! 启动 HTTP 接口与订单对账 worker 池，共享同一个关闭信号。

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gophermart::{
    accrual::{AccrualClient, AccrualFetcher},
    auth::{JwtConfig, JwtManager},
    cli::Cli,
    repository::SCHEMA_STATEMENTS,
    routes,
    state::AppState,
    worker::spawn_pool,
};
use loyalty_shared::{config::AppConfig, database::Database, observability};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy_load();
    let cli = Cli::parse();

    let mut config = AppConfig::load("gophermart")?;
    cli.apply(&mut config);

    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting gophermart on {}", config.server_addr());

    if config.auth.jwt_secret == loyalty_shared::config::AuthConfig::default().jwt_secret {
        if config.is_production() {
            anyhow::bail!("JWT secret must be set in production environment");
        }
        warn!("Using default JWT secret - set JWT_SECRET for production");
    }

    let db = Database::connect(&config.database).await?;
    db.init_schema(SCHEMA_STATEMENTS).await?;

    let jwt_manager = JwtManager::new(JwtConfig::from(&config.auth));
    let state = AppState::with_database(
        db.clone(),
        jwt_manager,
        config.worker.claim_lease_seconds,
    )
    .with_password_cost(config.auth.bcrypt_cost);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let accrual: Arc<dyn AccrualFetcher> =
        Arc::new(AccrualClient::new(&config.accrual)?.with_shutdown(shutdown_rx.clone()));
    info!(
        "Accrual system at {} (shared backoff: {})",
        config.accrual.base_url, config.accrual.shared_backoff
    );

    let workers = spawn_pool(
        config.worker.count,
        state.orders.clone(),
        accrual,
        &config.worker,
        shutdown_rx,
    );
    info!("Started {} reconcile workers", workers.len());

    let app = routes::app(
        state,
        Duration::from_secs(config.server.request_timeout_seconds),
    );

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, waiting for workers...");
    let _ = shutdown_tx.send(true);
    for handle in workers {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 读取 .env，文件不存在时忽略
fn dotenvy_load() {
    match dotenvy::dotenv() {
        Err(e) if !e.not_found() => eprintln!("Failed to load .env: {}", e),
        _ => {}
    }
}

/// 监听关闭信号
///
/// 收到 Ctrl+C 或 SIGTERM 后返回，触发 axum 的优雅关闭流程。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
