//! 积分计算服务 HTTP 客户端
//!
//! 响应码约定：
//! - 200：返回计算状态与积分
//! - 204：积分服务尚未登记该订单，下一轮再查
//! - 429：按 Retry-After 挂起当前调用方后重试同一请求，其他调用方不受影响
//! - 其他：本次请求失败，不自动重试

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loyalty_shared::config::AccrualConfig;
use loyalty_shared::observability::metrics;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::AccrualStatus;

/// 客户端错误
#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("积分服务请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("积分服务返回非预期状态码: {0}")]
    UnexpectedStatus(u16),

    #[error("等待限流期间收到关闭信号")]
    Cancelled,
}

/// 积分服务 200 响应体
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    /// 仅 PROCESSED 时存在
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub accrual: Option<Decimal>,
}

impl AccrualResponse {
    /// 积分金额，保留两位小数；缺失或为负时按 0 处理
    pub fn accrual_amount(&self) -> Decimal {
        self.accrual
            .map(|v| v.round_dp(2))
            .filter(|v| *v > Decimal::ZERO)
            .unwrap_or(Decimal::ZERO)
    }
}

/// 单次查询结果
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 积分服务给出了订单状态
    Resolved(AccrualResponse),
    /// 积分服务尚不知道该订单（204）
    Unknown,
}

/// 积分查询接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualFetcher: Send + Sync {
    async fn fetch(&self, number: &str) -> Result<FetchOutcome, AccrualError>;
}

/// 进程级限流闸门
///
/// 任一调用方收到 429 后记录“不早于”时间点，所有调用方发请求前都要等到该时间点之后
#[derive(Debug, Default)]
pub struct BackoffGate {
    not_before: Mutex<Option<Instant>>,
}

impl BackoffGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 推后闸门，只会往后推不会提前
    pub async fn push(&self, until: Instant) {
        let mut guard = self.not_before.lock().await;
        if guard.is_none_or(|current| current < until) {
            *guard = Some(until);
        }
    }

    /// 当前仍生效的截止时间
    pub async fn deadline(&self) -> Option<Instant> {
        let guard = self.not_before.lock().await;
        guard.filter(|t| *t > Instant::now())
    }
}

/// 积分服务客户端
#[derive(Clone)]
pub struct AccrualClient {
    http: reqwest::Client,
    base_url: String,
    default_retry_after: Duration,
    gate: Option<Arc<BackoffGate>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl AccrualClient {
    /// 按配置创建客户端
    ///
    /// `shared_backoff` 开启时自动创建一个共享闸门
    pub fn new(config: &AccrualConfig) -> Result<Self, AccrualError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_retry_after: Duration::from_secs(config.default_retry_after_seconds),
            gate: config.shared_backoff.then(|| Arc::new(BackoffGate::new())),
            shutdown: None,
        })
    }

    /// 关闭信号到达时中断 Retry-After 等待
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// 指定共享闸门（多个客户端实例共用）
    pub fn with_gate(mut self, gate: Arc<BackoffGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn order_url(&self, number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }

    /// 可被关闭信号打断的等待
    async fn pause(&self, wait: Duration) -> Result<(), AccrualError> {
        let Some(shutdown) = &self.shutdown else {
            tokio::time::sleep(wait).await;
            return Ok(());
        };

        let mut shutdown = shutdown.clone();
        let sleep = tokio::time::sleep(wait);
        tokio::pin!(sleep);

        tokio::select! {
            biased;
            // 发送端被 drop 时该分支不匹配，继续等待 sleep
            Ok(()) = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => {
                Err(AccrualError::Cancelled)
            }
            _ = &mut sleep => Ok(()),
        }
    }
}

/// Retry-After 上限，超过按上限等待
pub(crate) const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// 解析 Retry-After 秒数，缺失或无法解析时使用默认值，结果不超过 [`MAX_RETRY_AFTER`]
pub(crate) fn retry_after(headers: &HeaderMap, default: Duration) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
        .min(MAX_RETRY_AFTER)
}

#[async_trait]
impl AccrualFetcher for AccrualClient {
    async fn fetch(&self, number: &str) -> Result<FetchOutcome, AccrualError> {
        let url = self.order_url(number);

        loop {
            if let Some(gate) = &self.gate {
                if let Some(deadline) = gate.deadline().await {
                    self.pause(deadline.saturating_duration_since(Instant::now()))
                        .await?;
                }
            }

            let start = Instant::now();
            let response = match self.http.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    metrics::record_accrual_fetch("error", start.elapsed().as_secs_f64());
                    return Err(e.into());
                }
            };
            let elapsed = start.elapsed().as_secs_f64();

            match response.status() {
                StatusCode::OK => {
                    let body: AccrualResponse = response.json().await.inspect_err(|_| {
                        metrics::record_accrual_fetch("error", elapsed);
                    })?;
                    metrics::record_accrual_fetch("ok", elapsed);
                    debug!(order = %number, status = ?body.status, "积分服务返回结果");
                    return Ok(FetchOutcome::Resolved(body));
                }
                StatusCode::NO_CONTENT => {
                    metrics::record_accrual_fetch("unknown", elapsed);
                    return Ok(FetchOutcome::Unknown);
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let wait = retry_after(response.headers(), self.default_retry_after);
                    metrics::record_accrual_fetch("rate_limited", elapsed);
                    metrics::record_rate_limited(wait.as_secs());
                    warn!(order = %number, retry_after_secs = wait.as_secs(), "积分服务限流，等待后重试");

                    if let Some(gate) = &self.gate {
                        if let Some(until) = Instant::now().checked_add(wait) {
                            gate.push(until).await;
                        }
                    }
                    self.pause(wait).await?;
                }
                other => {
                    metrics::record_accrual_fetch("error", elapsed);
                    return Err(AccrualError::UnexpectedStatus(other.as_u16()));
                }
            }
        }
    }
}
