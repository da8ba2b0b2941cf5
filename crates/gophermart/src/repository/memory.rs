//! 内存存储
//!
//! 基于 DashMap 的订单仓储、余额账本与用户仓储，适用于测试和本地开发。
//! 加锁顺序固定为 orders → balances → withdrawals，且不跨 await 持有引用。

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;

use super::traits::{BalanceLedger, OrderStore, UserStore};
use crate::error::{Result, StoreError};
use crate::models::{Balance, ClaimedOrder, Order, OrderStatus, UploadOutcome, User, Withdrawal};

#[derive(Debug, Clone)]
struct OrderRecord {
    order: Order,
    /// 插入序号，上传时间相同时保证先进先出
    seq: u64,
    lease_expires_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.order.status {
            OrderStatus::New => true,
            OrderStatus::Processing => self.lease_expires_at.is_none_or(|t| t < now),
            OrderStatus::Processed | OrderStatus::Invalid => false,
        }
    }
}

/// 内存存储
///
/// 克隆后共享同一份数据
#[derive(Debug, Clone)]
pub struct MemoryStore {
    orders: Arc<DashMap<String, OrderRecord>>,
    balances: Arc<DashMap<i64, Balance>>,
    withdrawals: Arc<DashMap<String, Withdrawal>>,
    users: Arc<DashMap<String, User>>,
    next_user_id: Arc<AtomicI64>,
    next_seq: Arc<AtomicU64>,
    claim_lease: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// 创建内存存储，默认租约 300 秒
    pub fn new() -> Self {
        Self::with_claim_lease(Duration::seconds(300))
    }

    pub fn with_claim_lease(claim_lease: Duration) -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
            balances: Arc::new(DashMap::new()),
            withdrawals: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
            next_user_id: Arc::new(AtomicI64::new(1)),
            next_seq: Arc::new(AtomicU64::new(0)),
            claim_lease,
        }
    }

    fn credit_balance(&self, user_id: i64, amount: Decimal) -> Balance {
        let mut balance = self.balances.entry(user_id).or_default();
        balance.current += amount;
        *balance
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, number: &str, user_id: i64) -> Result<UploadOutcome> {
        match self.orders.entry(number.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get().order.user_id == user_id {
                    Ok(UploadOutcome::AlreadyUploadedBySelf)
                } else {
                    Err(StoreError::OrderOwnedByAnotherUser(number.to_string()))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(OrderRecord {
                    order: Order::new(number, user_id),
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    lease_expires_at: None,
                });
                Ok(UploadOutcome::Created)
            }
        }
    }

    async fn get_order(&self, number: &str) -> Result<Option<Order>> {
        Ok(self.orders.get(number).map(|r| r.order.clone()))
    }

    async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>> {
        let mut records: Vec<OrderRecord> = self
            .orders
            .iter()
            .filter(|r| r.order.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| {
            b.order
                .uploaded_at
                .cmp(&a.order.uploaded_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(records.into_iter().map(|r| r.order).collect())
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<String>> {
        let now = Utc::now();
        let mut pending: Vec<(DateTime<Utc>, u64, String)> = self
            .orders
            .iter()
            .filter(|r| r.is_claimable(now))
            .map(|r| (r.order.uploaded_at, r.seq, r.key().clone()))
            .collect();
        pending.sort();

        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(pending
            .into_iter()
            .take(limit)
            .map(|(_, _, number)| number)
            .collect())
    }

    async fn claim(&self, numbers: &[String]) -> Result<Vec<ClaimedOrder>> {
        let now = Utc::now();
        let mut claimed = Vec::new();

        for number in numbers {
            // get_mut 持有分片写锁，检查与更新在同一临界区内完成
            if let Some(mut record) = self.orders.get_mut(number) {
                if record.is_claimable(now) {
                    record.order.status = OrderStatus::Processing;
                    let lease_expires_at = now + self.claim_lease;
                    record.lease_expires_at = Some(lease_expires_at);
                    claimed.push(ClaimedOrder {
                        number: number.clone(),
                        user_id: record.order.user_id,
                        lease_expires_at,
                    });
                }
            }
        }

        Ok(claimed)
    }

    async fn apply_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        let Some(mut record) = self.orders.get_mut(number) else {
            return Ok(false);
        };
        if record.order.status.is_terminal() {
            return Ok(false);
        }

        record.order.status = status;
        record.order.accrual = accrual;
        record.lease_expires_at = None;
        Ok(true)
    }

    async fn finalize(
        &self,
        number: &str,
        user_id: i64,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        let Some(mut record) = self.orders.get_mut(number) else {
            return Ok(false);
        };
        if record.order.status.is_terminal() || record.order.user_id != user_id {
            return Ok(false);
        }

        record.order.status = status;
        record.order.accrual = accrual;
        record.lease_expires_at = None;

        // 持有订单写锁期间入账，状态迁移与入账对外表现为一次原子操作
        if status == OrderStatus::Processed && accrual > Decimal::ZERO {
            self.credit_balance(user_id, accrual);
        }

        Ok(true)
    }

    async fn release(&self, number: &str, lease_expires_at: DateTime<Utc>) -> Result<()> {
        if let Some(mut record) = self.orders.get_mut(number) {
            if record.order.status == OrderStatus::Processing
                && record.lease_expires_at == Some(lease_expires_at)
            {
                record.lease_expires_at = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceLedger for MemoryStore {
    async fn credit(&self, user_id: i64, amount: Decimal) -> Result<Balance> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }
        Ok(self.credit_balance(user_id, amount))
    }

    async fn debit(&self, user_id: i64, order_number: &str, sum: Decimal) -> Result<Balance> {
        if sum <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(sum));
        }

        // 余额条目的写锁覆盖整个“检查 → 写提现记录 → 扣减”过程
        let mut balance = self.balances.entry(user_id).or_default();

        if self.withdrawals.contains_key(order_number) {
            return Err(StoreError::DuplicateWithdrawal(order_number.to_string()));
        }
        if balance.current < sum {
            return Err(StoreError::InsufficientFunds {
                required: sum,
                available: balance.current,
            });
        }

        match self.withdrawals.entry(order_number.to_string()) {
            Entry::Occupied(_) => {
                return Err(StoreError::DuplicateWithdrawal(order_number.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(Withdrawal {
                    order_number: order_number.to_string(),
                    sum,
                    processed_at: Utc::now(),
                    user_id,
                });
            }
        }

        balance.current -= sum;
        balance.withdrawn += sum;
        Ok(*balance)
    }

    async fn get_balance(&self, user_id: i64) -> Result<Balance> {
        Ok(self
            .balances
            .get(&user_id)
            .map(|b| *b)
            .unwrap_or_default())
    }

    async fn list_withdrawals(&self, user_id: i64) -> Result<Vec<Withdrawal>> {
        let mut withdrawals: Vec<Withdrawal> = self
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.value().clone())
            .collect();
        withdrawals.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(withdrawals)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<i64> {
        match self.users.entry(login.to_string()) {
            Entry::Occupied(_) => Err(StoreError::UserExists(login.to_string())),
            Entry::Vacant(slot) => {
                let id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
                slot.insert(User {
                    id,
                    login: login.to_string(),
                    password_hash: password_hash.to_string(),
                });
                Ok(id)
            }
        }
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        Ok(self.users.get(login).map(|u| u.value().clone()))
    }
}
