//! 用户实体

use sqlx::FromRow;

/// 注册用户
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
}
