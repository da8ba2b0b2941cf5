//! 订单上传与查询

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::dto::OrderResponse;
use crate::error::{ApiError, ApiResult};
use crate::luhn;
use crate::middleware::AuthUser;
use crate::models::UploadOutcome;
use crate::state::AppState;

/// 上传订单号
///
/// POST /api/user/orders，请求体为纯文本订单号
/// - 202：新订单已受理
/// - 200：本人已上传过
/// - 409：已被其他用户上传
pub async fn upload_order(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: String,
) -> ApiResult<StatusCode> {
    let number = body.trim();
    if number.is_empty() {
        return Err(ApiError::Validation("订单号不能为空".to_string()));
    }
    if !luhn::is_valid(number) {
        return Err(ApiError::InvalidOrderNumber(number.to_string()));
    }

    match state.orders.create_order(number, user_id).await? {
        UploadOutcome::Created => {
            info!(user_id, order = %number, "订单已受理");
            Ok(StatusCode::ACCEPTED)
        }
        UploadOutcome::AlreadyUploadedBySelf => Ok(StatusCode::OK),
    }
}

/// 查询本人订单，按上传时间倒序
///
/// GET /api/user/orders，无订单时返回 204
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Response> {
    let orders = state.orders.list_orders(user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(body).into_response())
}
