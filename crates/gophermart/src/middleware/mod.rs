//! 中间件模块

mod auth;

pub use auth::{AUTH_COOKIE, AuthUser, auth_middleware};
