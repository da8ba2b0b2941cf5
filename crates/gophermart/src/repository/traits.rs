//! 仓储 Trait 定义
//!
//! worker 与 HTTP 层只依赖这些接口；并发语义（领取互斥、入账只发生一次、
//! 提现原子性）是接口契约的一部分，每个实现都必须满足。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{Balance, ClaimedOrder, Order, OrderStatus, UploadOutcome, User, Withdrawal};

/// 订单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 登记订单
    ///
    /// 订单号全局唯一，先上传者拥有；他人再上传返回 `OrderOwnedByAnotherUser`
    async fn create_order(&self, number: &str, user_id: i64) -> Result<UploadOutcome>;

    async fn get_order(&self, number: &str) -> Result<Option<Order>>;

    /// 用户的订单，按上传时间倒序
    async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>>;

    /// 待处理订单号，按上传时间正序，最多 limit 条
    ///
    /// 只返回可领取的订单：NEW，或租约已释放/已过期的 PROCESSING
    async fn list_pending(&self, limit: i64) -> Result<Vec<String>>;

    /// 领取订单
    ///
    /// 条件更新为 PROCESSING 并写入租约，返回实际领取成功的订单及其所属用户。
    /// 同一订单被并发领取时至多一方成功。
    async fn claim(&self, numbers: &[String]) -> Result<Vec<ClaimedOrder>>;

    /// 写入非终态结果并释放租约
    ///
    /// 已处于终态的订单不会被改写，此时返回 false
    async fn apply_result(&self, number: &str, status: OrderStatus, accrual: Decimal)
    -> Result<bool>;

    /// 写入终态结果
    ///
    /// 仅当订单尚未处于终态时生效；PROCESSED 且积分为正时在同一事务内给用户入账。
    /// 返回本次调用是否完成了状态迁移，重复调用返回 false 且不会重复入账。
    async fn finalize(
        &self,
        number: &str,
        user_id: i64,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool>;

    /// 释放租约，订单在下一轮可被重新领取
    ///
    /// 仅当订单当前租约仍是 `lease_expires_at` 时生效；租约过期后已被他人重新领取的，
    /// 释放不会影响新租约
    async fn release(&self, number: &str, lease_expires_at: DateTime<Utc>) -> Result<()>;
}

/// 余额账本接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// 入账，余额行不存在时创建
    async fn credit(&self, user_id: i64, amount: Decimal) -> Result<Balance>;

    /// 提现
    ///
    /// 持有余额行锁完成“检查余额 → 写提现记录 → 扣减”，任一步失败整体回滚。
    /// 订单号已提现过时返回 `DuplicateWithdrawal`，即使余额同样不足
    async fn debit(&self, user_id: i64, order_number: &str, sum: Decimal) -> Result<Balance>;

    /// 查询余额，无记录时返回 0/0
    async fn get_balance(&self, user_id: i64) -> Result<Balance>;

    /// 用户的提现记录，按时间倒序
    async fn list_withdrawals(&self, user_id: i64) -> Result<Vec<Withdrawal>>;
}

/// 用户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 创建用户，返回用户 ID；登录名冲突返回 `UserExists`
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<i64>;

    async fn find_by_login(&self, login: &str) -> Result<Option<User>>;
}
