//! 余额账本仓储
//!
//! 余额行是唯一显式加锁的资源：入账依赖 upsert 的行锁，提现在事务内 `FOR UPDATE`。

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};

use super::traits::BalanceLedger;
use crate::error::{Result, StoreError, is_unique_violation};
use crate::models::{Balance, Withdrawal};

/// PostgreSQL 余额账本
#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中入账
    ///
    /// 供订单终态写入复用，保证状态迁移与入账同时提交
    pub async fn credit_in_tx(
        conn: &mut PgConnection,
        user_id: i64,
        amount: Decimal,
    ) -> Result<Balance> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }

        let balance = sqlx::query_as::<_, Balance>(
            r#"
            INSERT INTO balances (user_id, current, withdrawn)
            VALUES ($1, $2, 0)
            ON CONFLICT (user_id) DO UPDATE
            SET current = balances.current + EXCLUDED.current
            RETURNING current, withdrawn
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(conn)
        .await?;

        Ok(balance)
    }

    /// 入账
    #[instrument(skip(self))]
    pub async fn credit(&self, user_id: i64, amount: Decimal) -> Result<Balance> {
        let mut conn = self.pool.acquire().await?;
        Self::credit_in_tx(&mut *conn, user_id, amount).await
    }

    /// 提现
    #[instrument(skip(self))]
    pub async fn debit(&self, user_id: i64, order_number: &str, sum: Decimal) -> Result<Balance> {
        if sum <= Decimal::ZERO {
            return Err(StoreError::InvalidAmount(sum));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let balance = sqlx::query_as::<_, Balance>(
            "SELECT current, withdrawn FROM balances WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM withdrawals WHERE order_number = $1)")
                .bind(order_number)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(StoreError::DuplicateWithdrawal(order_number.to_string()));
        }

        if balance.current < sum {
            // tx 在 drop 时回滚
            return Err(StoreError::InsufficientFunds {
                required: sum,
                available: balance.current,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO withdrawals (order_number, user_id, sum, processed_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(order_number)
        .bind(user_id)
        .bind(sum)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateWithdrawal(order_number.to_string())
            } else {
                StoreError::Database(e)
            }
        })?;

        let balance = sqlx::query_as::<_, Balance>(
            r#"
            UPDATE balances
            SET current = current - $2, withdrawn = withdrawn + $2
            WHERE user_id = $1
            RETURNING current, withdrawn
            "#,
        )
        .bind(user_id)
        .bind(sum)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(user_id, order = %order_number, %sum, "提现完成");
        Ok(balance)
    }

    /// 查询余额
    pub async fn get_balance(&self, user_id: i64) -> Result<Balance> {
        let balance = sqlx::query_as::<_, Balance>(
            "SELECT current, withdrawn FROM balances WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or_default())
    }

    /// 列出用户的提现记录
    pub async fn list_withdrawals(&self, user_id: i64) -> Result<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT order_number, sum, processed_at, user_id
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }
}

#[async_trait]
impl BalanceLedger for LedgerRepository {
    async fn credit(&self, user_id: i64, amount: Decimal) -> Result<Balance> {
        self.credit(user_id, amount).await
    }

    async fn debit(&self, user_id: i64, order_number: &str, sum: Decimal) -> Result<Balance> {
        self.debit(user_id, order_number, sum).await
    }

    async fn get_balance(&self, user_id: i64) -> Result<Balance> {
        self.get_balance(user_id).await
    }

    async fn list_withdrawals(&self, user_id: i64) -> Result<Vec<Withdrawal>> {
        self.list_withdrawals(user_id).await
    }
}
