//! 领域模型
//!
//! 订单、余额、提现记录与用户实体，均支持 sqlx 行映射与 serde 序列化。

mod balance;
mod enums;
mod order;
mod user;

pub use balance::{Balance, Withdrawal};
pub use enums::{AccrualStatus, OrderStatus};
pub use order::{ClaimedOrder, Order, UploadOutcome};
pub use user::User;
