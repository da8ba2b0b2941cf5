//! HTTP 请求处理器
//!
//! 只做参数校验与错误映射，业务语义全部在仓储层

pub mod auth;
pub mod balance;
pub mod order;
