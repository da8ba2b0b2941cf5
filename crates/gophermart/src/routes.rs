//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use loyalty_shared::observability::middleware as obs_middleware;
use serde_json::{Value, json};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::warn;

use crate::{handlers, middleware::auth_middleware, state::AppState};

/// 公开路由：注册与登录
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
}

/// 需要认证的路由
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            post(handlers::order::upload_order).get(handlers::order::list_orders),
        )
        .route("/balance", get(handlers::balance::get_balance))
        .route("/balance/withdraw", post(handlers::balance::withdraw))
        .route("/withdrawals", get(handlers::balance::list_withdrawals))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// 构建 /api/user 下的全部路由
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(public_routes())
        .merge(protected_routes(state))
}

/// 构建完整应用
///
/// 除业务路由外还挂载存活/就绪探针和通用中间件
pub fn app(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api/user", api_routes(state.clone()))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 存活探针
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "gophermart"
    }))
}

/// 就绪探针：检查数据库连接
///
/// 失败时附带错误码和是否可重试，瞬时故障（连接池超时、网络错误）可等待恢复
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let failure = match &state.database {
        Some(db) => db.health_check().await.err(),
        None => None,
    };

    let Some(err) = failure else {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "gophermart",
                "checks": { "database": "ok" }
            })),
        );
    };

    warn!(code = err.code(), retryable = err.is_retryable(), error = %err, "就绪检查失败");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "degraded",
            "service": "gophermart",
            "checks": { "database": "fail" },
            "code": err.code(),
            "retryable": err.is_retryable()
        })),
    )
}
