//! 余额、提现与提现记录

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use loyalty_shared::observability::metrics;
use rust_decimal::Decimal;
use tracing::info;

use crate::dto::WithdrawRequest;
use crate::error::{ApiError, ApiResult, StoreError};
use crate::luhn;
use crate::middleware::AuthUser;
use crate::models::Balance;
use crate::state::AppState;

/// 查询余额
///
/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Balance>> {
    Ok(Json(state.ledger.get_balance(user_id).await?))
}

/// 提现
///
/// POST /api/user/balance/withdraw
/// - 402：余额不足
/// - 409：该订单号已提现
/// - 422：订单号校验失败
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> ApiResult<Json<Balance>> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let number = req.order.trim();

    if req.sum <= Decimal::ZERO {
        return Err(ApiError::Validation("提现金额必须大于 0".to_string()));
    }
    if !luhn::is_valid(number) {
        return Err(ApiError::InvalidOrderNumber(number.to_string()));
    }

    match state.ledger.debit(user_id, number, req.sum.round_dp(2)).await {
        Ok(balance) => {
            metrics::record_withdrawal("success");
            info!(user_id, order = %number, sum = %req.sum, "提现成功");
            Ok(Json(balance))
        }
        Err(e) => {
            metrics::record_withdrawal(match &e {
                StoreError::InsufficientFunds { .. } => "insufficient_funds",
                StoreError::DuplicateWithdrawal(_) => "duplicate",
                _ => "error",
            });
            Err(e.into())
        }
    }
}

/// 查询提现记录，按时间倒序
///
/// GET /api/user/withdrawals，无记录时返回 204
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Response> {
    let withdrawals = state.ledger.list_withdrawals(user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(withdrawals).into_response())
}
