//! 余额与提现记录

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// 用户积分余额
///
/// current 不会为负，withdrawn 只增不减
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct Balance {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

/// 提现记录
///
/// 以订单号为主键，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Withdrawal {
    #[serde(rename = "order")]
    pub order_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
    #[serde(skip)]
    pub user_id: i64,
}
