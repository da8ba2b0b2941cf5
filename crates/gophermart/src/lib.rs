//! Gophermart 积分系统
//!
//! 用户上传订单号，后台 worker 向外部积分计算系统查询结果并入账，
//! 用户可查询余额并用积分抵扣新订单。
//!
//! ## 模块结构
//!
//! - `luhn`: 订单号校验
//! - `accrual`: 积分计算系统客户端，处理 429 限流
//! - `repository`: 订单、余额、用户存储（PostgreSQL 与内存两种实现）
//! - `worker`: 订单对账 worker 池
//! - `handlers` / `routes` / `middleware`: HTTP 接口与认证
//! - `cli`: 命令行参数

pub mod accrual;
pub mod auth;
pub mod cli;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod luhn;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod state;
pub mod worker;

pub use error::{ApiError, ApiResult, StoreError};
pub use state::AppState;
