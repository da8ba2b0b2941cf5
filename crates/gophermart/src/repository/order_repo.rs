//! 订单仓储
//!
//! 领取依赖带条件的 UPDATE：并发领取同一订单时，后到的语句在行锁释放后重新求值
//! WHERE 条件，因此至多一方返回该行。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::ledger_repo::LedgerRepository;
use super::traits::OrderStore;
use crate::error::{Result, StoreError};
use crate::models::{ClaimedOrder, Order, OrderStatus, UploadOutcome};

/// 可领取条件：NEW，或租约已释放/过期的 PROCESSING
const CLAIMABLE: &str = r#"
    (status = 'NEW'
     OR (status = 'PROCESSING' AND (lease_expires_at IS NULL OR lease_expires_at < NOW())))
"#;

/// PostgreSQL 订单仓储
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
    /// 领取租约时长（秒）
    claim_lease_seconds: i64,
}

impl OrderRepository {
    pub fn new(pool: PgPool, claim_lease_seconds: i64) -> Self {
        Self {
            pool,
            claim_lease_seconds,
        }
    }

    /// 登记订单
    #[instrument(skip(self))]
    pub async fn create_order(&self, number: &str, user_id: i64) -> Result<UploadOutcome> {
        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO orders (number, user_id, status, accrual, uploaded_at)
            VALUES ($1, $2, $3, 0, NOW())
            ON CONFLICT (number) DO NOTHING
            RETURNING number
            "#,
        )
        .bind(number)
        .bind(user_id)
        .bind(OrderStatus::New)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(UploadOutcome::Created);
        }

        let owner: i64 = sqlx::query_scalar("SELECT user_id FROM orders WHERE number = $1")
            .bind(number)
            .fetch_one(&self.pool)
            .await?;

        if owner == user_id {
            Ok(UploadOutcome::AlreadyUploadedBySelf)
        } else {
            Err(StoreError::OrderOwnedByAnotherUser(number.to_string()))
        }
    }

    pub async fn get_order(&self, number: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, user_id, status, accrual, uploaded_at
            FROM orders
            WHERE number = $1
            "#,
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    pub async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, user_id, status, accrual, uploaded_at
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    pub async fn list_pending(&self, limit: i64) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT number FROM orders WHERE {} ORDER BY uploaded_at ASC LIMIT $1",
            CLAIMABLE
        );
        let numbers = sqlx::query_scalar::<_, String>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(numbers)
    }

    /// 领取订单并写入租约
    #[instrument(skip(self), fields(count = numbers.len()))]
    pub async fn claim(&self, numbers: &[String]) -> Result<Vec<ClaimedOrder>> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            UPDATE orders
            SET status = 'PROCESSING',
                lease_expires_at = NOW() + make_interval(secs => $2)
            WHERE number = ANY($1) AND {}
            RETURNING number, user_id, lease_expires_at
            "#,
            CLAIMABLE
        );
        let claimed = sqlx::query_as::<_, ClaimedOrder>(&sql)
            .bind(numbers)
            .bind(self.claim_lease_seconds as f64)
            .fetch_all(&self.pool)
            .await?;

        debug!(requested = numbers.len(), claimed = claimed.len(), "领取订单");
        Ok(claimed)
    }

    /// 写入非终态结果并释放租约
    #[instrument(skip(self))]
    pub async fn apply_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, accrual = $3, lease_expires_at = NULL
            WHERE number = $1 AND status NOT IN ('PROCESSED', 'INVALID')
            "#,
        )
        .bind(number)
        .bind(status)
        .bind(accrual)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 写入终态结果，必要时在同一事务内入账
    #[instrument(skip(self))]
    pub async fn finalize(
        &self,
        number: &str,
        user_id: i64,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, accrual = $3, lease_expires_at = NULL
            WHERE number = $1 AND user_id = $4 AND status NOT IN ('PROCESSED', 'INVALID')
            "#,
        )
        .bind(number)
        .bind(status)
        .bind(accrual)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if status == OrderStatus::Processed && accrual > Decimal::ZERO {
            LedgerRepository::credit_in_tx(&mut *tx, user_id, accrual).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn release(&self, number: &str, lease_expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET lease_expires_at = NULL
            WHERE number = $1 AND status = 'PROCESSING' AND lease_expires_at = $2
            "#,
        )
        .bind(number)
        .bind(lease_expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn create_order(&self, number: &str, user_id: i64) -> Result<UploadOutcome> {
        self.create_order(number, user_id).await
    }

    async fn get_order(&self, number: &str) -> Result<Option<Order>> {
        self.get_order(number).await
    }

    async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>> {
        self.list_orders(user_id).await
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<String>> {
        self.list_pending(limit).await
    }

    async fn claim(&self, numbers: &[String]) -> Result<Vec<ClaimedOrder>> {
        self.claim(numbers).await
    }

    async fn apply_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        self.apply_result(number, status, accrual).await
    }

    async fn finalize(
        &self,
        number: &str,
        user_id: i64,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        self.finalize(number, user_id, status, accrual).await
    }

    async fn release(&self, number: &str, lease_expires_at: DateTime<Utc>) -> Result<()> {
        self.release(number, lease_expires_at).await
    }
}
