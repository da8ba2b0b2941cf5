//! 订单对账 Worker
//!
//! 每一轮：列出待处理订单 → 领取 → 逐个查询积分服务 → 写回结果并按需入账，
//! 然后休眠固定间隔。多个 worker 之间只依赖存储层的条件更新互斥，不做额外协调。

use std::sync::Arc;
use std::time::Duration;

use loyalty_shared::config::WorkerConfig;
use loyalty_shared::observability::metrics;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::accrual::{AccrualError, AccrualFetcher, FetchOutcome};
use crate::error::{Result, StoreError};
use crate::models::{ClaimedOrder, OrderStatus};
use crate::repository::OrderStore;

/// 单轮处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// 成功领取的订单数
    pub claimed: usize,
    /// 本轮进入终态的订单数
    pub resolved: usize,
    /// 释放租约留待下一轮的订单数
    pub deferred: usize,
}

/// 订单对账 Worker
pub struct ReconcileWorker {
    name: String,
    orders: Arc<dyn OrderStore>,
    accrual: Arc<dyn AccrualFetcher>,
    /// 每轮最多领取的订单数
    batch_size: i64,
    /// 两轮之间的休眠间隔
    poll_interval: Duration,
}

impl ReconcileWorker {
    pub fn new(
        name: impl Into<String>,
        orders: Arc<dyn OrderStore>,
        accrual: Arc<dyn AccrualFetcher>,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            orders,
            accrual,
            batch_size,
            poll_interval,
        }
    }

    /// 使用配置创建
    pub fn from_config(
        name: impl Into<String>,
        orders: Arc<dyn OrderStore>,
        accrual: Arc<dyn AccrualFetcher>,
        config: &WorkerConfig,
    ) -> Self {
        Self::new(
            name,
            orders,
            accrual,
            config.batch_size,
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// 主循环：持续处理直到收到关闭信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            worker = %self.name,
            batch_size = self.batch_size,
            poll_interval = ?self.poll_interval,
            "ReconcileWorker 已启动"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_cycle(&shutdown).await {
                Ok(report) if report.claimed > 0 => {
                    debug!(worker = %self.name, ?report, "本轮对账完成");
                }
                Ok(_) => {}
                Err(e) => error!(worker = %self.name, error = %e, "对账轮次出错"),
            }

            metrics::set_worker_last_run(&self.name, chrono::Utc::now().timestamp() as f64);

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // 发送端被 drop 同样视为关闭
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(worker = %self.name, "收到关闭信号，ReconcileWorker 退出");
    }

    /// 执行一轮对账
    ///
    /// 单个订单的失败只记录日志，不会中断本轮其余订单
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> Result<CycleReport> {
        let pending = self.orders.list_pending(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(CycleReport::default());
        }

        let claimed = self.orders.claim(&pending).await?;
        let mut report = CycleReport {
            claimed: claimed.len(),
            ..Default::default()
        };

        let mut remaining = claimed.into_iter();
        for order in remaining.by_ref() {
            match self.process(&order).await {
                Ok(true) => report.resolved += 1,
                Ok(false) => report.deferred += 1,
                Err(ProcessError::Cancelled) => {
                    self.release(&order).await;
                    report.deferred += 1;
                    break;
                }
                Err(ProcessError::Store(e)) => {
                    error!(worker = %self.name, order = %order.number, error = %e, "写回订单结果失败");
                    self.release(&order).await;
                    report.deferred += 1;
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        // 关闭时尚未处理的订单立即释放，不必等租约过期
        for order in remaining {
            self.release(&order).await;
            report.deferred += 1;
        }

        Ok(report)
    }

    /// 处理单个已领取订单，返回是否进入终态
    async fn process(&self, order: &ClaimedOrder) -> std::result::Result<bool, ProcessError> {
        let response = match self.accrual.fetch(&order.number).await {
            Ok(FetchOutcome::Resolved(resp)) => resp,
            Ok(FetchOutcome::Unknown) => {
                debug!(order = %order.number, "积分服务尚未登记该订单");
                self.orders
                    .release(&order.number, order.lease_expires_at)
                    .await?;
                return Ok(false);
            }
            Err(AccrualError::Cancelled) => return Err(ProcessError::Cancelled),
            Err(e) => {
                warn!(worker = %self.name, order = %order.number, error = %e, "查询积分失败，留待下一轮");
                self.orders
                    .release(&order.number, order.lease_expires_at)
                    .await?;
                return Ok(false);
            }
        };

        let status = response.status.to_order_status();
        let accrual = response.accrual_amount();

        if !status.is_terminal() {
            self.orders
                .apply_result(&order.number, status, accrual)
                .await?;
            return Ok(false);
        }

        let applied = self
            .orders
            .finalize(&order.number, order.user_id, status, accrual)
            .await?;

        if applied {
            metrics::record_order_resolved(status.as_str());
            if status == OrderStatus::Processed && accrual > Decimal::ZERO {
                metrics::record_credit(accrual.to_f64().unwrap_or_default());
            }
            info!(
                order = %order.number,
                user_id = order.user_id,
                status = %status,
                %accrual,
                "订单已完成对账"
            );
        } else {
            debug!(order = %order.number, "订单已由其他 worker 写入终态");
        }

        Ok(true)
    }

    async fn release(&self, order: &ClaimedOrder) {
        if let Err(e) = self
            .orders
            .release(&order.number, order.lease_expires_at)
            .await
        {
            warn!(worker = %self.name, order = %order.number, error = %e, "释放租约失败，等待租约过期");
        }
    }
}

enum ProcessError {
    Cancelled,
    Store(StoreError),
}

impl From<StoreError> for ProcessError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// 启动 worker 池
///
/// 所有 worker 共享同一个关闭信号，返回的句柄用于等待它们退出
pub fn spawn_pool(
    count: usize,
    orders: Arc<dyn OrderStore>,
    accrual: Arc<dyn AccrualFetcher>,
    config: &WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|i| {
            let worker = ReconcileWorker::from_config(
                format!("reconcile-{}", i),
                orders.clone(),
                accrual.clone(),
                config,
            );
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}
