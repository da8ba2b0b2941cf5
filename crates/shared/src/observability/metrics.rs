//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn describe_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "accrual_requests_total",
        "Total number of accrual service requests by outcome"
    );
    metrics::describe_histogram!(
        "accrual_request_duration_seconds",
        "Accrual service request duration in seconds"
    );
    metrics::describe_counter!(
        "accrual_rate_limited_total",
        "Number of 429 responses received from the accrual service"
    );

    metrics::describe_counter!(
        "orders_resolved_total",
        "Orders that reached a terminal status"
    );
    metrics::describe_counter!("balance_credits_total", "Accrual credits applied to balances");
    metrics::describe_counter!("withdrawals_total", "Withdrawal attempts by outcome");
    metrics::describe_gauge!(
        "reconcile_worker_last_run_timestamp",
        "Unix timestamp of the last reconciliation cycle per worker"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次积分服务请求
///
/// outcome 取值：ok / unknown / rate_limited / error
#[inline]
pub fn record_accrual_fetch(outcome: &str, duration_secs: f64) {
    metrics::counter!("accrual_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("accrual_request_duration_seconds").record(duration_secs);
}

/// 记录一次 429 限流
#[inline]
pub fn record_rate_limited(retry_after_secs: u64) {
    metrics::counter!("accrual_rate_limited_total").increment(1);
    metrics::histogram!("accrual_retry_after_seconds").record(retry_after_secs as f64);
}

/// 记录订单进入终态
#[inline]
pub fn record_order_resolved(status: &str) {
    metrics::counter!("orders_resolved_total", "status" => status.to_string()).increment(1);
}

/// 记录积分入账
#[inline]
pub fn record_credit(amount: f64) {
    metrics::counter!("balance_credits_total").increment(1);
    metrics::histogram!("balance_credit_amount").record(amount);
}

/// 记录提现结果
///
/// status 取值：success / insufficient_funds / duplicate / error
#[inline]
pub fn record_withdrawal(status: &str) {
    metrics::counter!("withdrawals_total", "status" => status.to_string()).increment(1);
}

/// 更新 worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str, timestamp: f64) {
    metrics::gauge!(
        "reconcile_worker_last_run_timestamp",
        "worker" => worker.to_string()
    )
    .set(timestamp);
}
