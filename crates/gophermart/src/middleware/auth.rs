//! JWT 认证中间件
//!
//! 依次从 `Authorization: Bearer` 头与 `auth_token` cookie 中取 Token，
//! 验证通过后把用户身份注入请求扩展。

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;

use crate::state::AppState;

/// 存放 Token 的 cookie 名
pub const AUTH_COOKIE: &str = "auth_token";

/// 已认证用户
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

fn bearer_token(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn cookie_token(request: &Request<Body>) -> Option<String> {
    CookieJar::from_headers(request.headers())
        .get(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// 认证中间件
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request).or_else(|| cookie_token(&request)) else {
        return unauthorized_response("缺少认证 Token");
    };

    let claims = match state.jwt_manager.verify_token(&token) {
        Ok(claims) => claims,
        Err(e) => return unauthorized_response(&e.to_string()),
    };

    let user_id = match claims.user_id() {
        Ok(id) => id,
        Err(e) => return unauthorized_response(&e.to_string()),
    };

    request.extensions_mut().insert(AuthUser(user_id));
    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// 生成 401 未授权响应
fn unauthorized_response(message: &str) -> Response {
    let body = json!({
        "success": false,
        "code": "UNAUTHORIZED",
        "message": message,
        "data": null
    });

    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}
