//! 错误类型定义
//!
//! `StoreError` 为存储层与账本的领域错误，`ApiError` 为 HTTP 层错误并负责映射状态码。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("余额不足: 需要 {required}, 可用 {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("该订单号已提现: {0}")]
    DuplicateWithdrawal(String),

    #[error("登录名已被占用: {0}")]
    UserExists(String),

    #[error("订单已被其他用户上传: {0}")]
    OrderOwnedByAnotherUser(String),

    #[error("金额必须大于 0: {0}")]
    InvalidAmount(Decimal),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
}

/// 存储层 Result 类型别名
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// 是否为业务错误（用户可见，不按系统故障记录日志）
    pub fn is_business_error(&self) -> bool {
        !matches!(self, Self::Database(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::DuplicateWithdrawal(_) => "DUPLICATE_WITHDRAWAL",
            Self::UserExists(_) => "USER_EXISTS",
            Self::OrderOwnedByAnotherUser(_) => "ORDER_OWNED_BY_ANOTHER_USER",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// 判断 sqlx 错误是否为唯一键冲突
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

/// HTTP 层错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("登录名或密码错误")]
    InvalidCredentials,

    #[error("参数验证失败: {0}")]
    Validation(String),
    #[error("订单号格式错误: {0}")]
    InvalidOrderNumber(String),

    #[error("登录名已被占用: {0}")]
    LoginTaken(String),
    #[error("订单已被其他用户上传: {0}")]
    OrderOwnedByAnotherUser(String),
    #[error("余额不足")]
    InsufficientFunds,
    #[error("该订单号已提现: {0}")]
    DuplicateWithdrawal(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidOrderNumber(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::LoginTaken(_) | Self::OrderOwnedByAnotherUser(_) | Self::DuplicateWithdrawal(_) => {
                StatusCode::CONFLICT
            }
            Self::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidOrderNumber(_) => "INVALID_ORDER_NUMBER",
            Self::LoginTaken(_) => "LOGIN_TAKEN",
            Self::OrderOwnedByAnotherUser(_) => "ORDER_OWNED_BY_ANOTHER_USER",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::DuplicateWithdrawal(_) => "DUPLICATE_WITHDRAWAL",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientFunds { .. } => Self::InsufficientFunds,
            StoreError::DuplicateWithdrawal(order) => Self::DuplicateWithdrawal(order),
            StoreError::UserExists(login) => Self::LoginTaken(login),
            StoreError::OrderOwnedByAnotherUser(order) => Self::OrderOwnedByAnotherUser(order),
            StoreError::InvalidAmount(sum) => Self::Validation(format!("金额必须大于 0: {}", sum)),
            StoreError::Database(e) => Self::Database(e),
        }
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// HTTP 层 Result 类型别名
pub type ApiResult<T> = std::result::Result<T, ApiError>;
