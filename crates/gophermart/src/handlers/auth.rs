//! 注册与登录

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::info;
use validator::Validate;

use crate::auth::{hash_password, verify_password};
use crate::dto::{CredentialsRequest, TokenResponse};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AUTH_COOKIE;
use crate::state::AppState;

/// 签发 Token，同时写入 Authorization 头与 cookie
fn issue_token(state: &AppState, jar: CookieJar, user_id: i64, login: &str) -> ApiResult<Response> {
    let (token, expires_at) = state.jwt_manager.generate_token(user_id, login)?;

    let header = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| ApiError::Internal(format!("Token 无法写入响应头: {}", e)))?;

    let cookie = Cookie::build((AUTH_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        [(AUTHORIZATION, header)],
        Json(TokenResponse { token, expires_at }),
    )
        .into_response())
}

fn parse_credentials(
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<CredentialsRequest> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    req.validate()?;
    Ok(req)
}

/// 用户注册
///
/// POST /api/user/register
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = parse_credentials(payload)?;

    let password_hash = hash_password(&req.password, state.password_cost)?;
    let user_id = state.users.create_user(&req.login, &password_hash).await?;

    info!(user_id, login = %req.login, "用户注册成功");
    issue_token(&state, jar, user_id, &req.login)
}

/// 用户登录
///
/// POST /api/user/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = parse_credentials(payload)?;

    let user = state
        .users
        .find_by_login(&req.login)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::InvalidCredentials);
    }

    issue_token(&state, jar, user.id, &user.login)
}
