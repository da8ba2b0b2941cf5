//! 订单实体

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

use super::OrderStatus;

/// 用户上传的订单
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Order {
    pub number: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub accrual: Decimal,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    pub fn new(number: impl Into<String>, user_id: i64) -> Self {
        Self {
            number: number.into(),
            user_id,
            status: OrderStatus::New,
            accrual: Decimal::ZERO,
            uploaded_at: Utc::now(),
        }
    }
}

/// 被 worker 成功领取的订单
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ClaimedOrder {
    pub number: String,
    pub user_id: i64,
    /// 本次领取写入的租约到期时间，释放时用来确认租约仍归自己
    pub lease_expires_at: DateTime<Utc>,
}

/// 上传订单的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 新订单已登记
    Created,
    /// 当前用户此前已上传过
    AlreadyUploadedBySelf,
}
