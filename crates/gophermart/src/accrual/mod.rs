//! 积分计算服务客户端

mod client;

pub use client::{
    AccrualClient, AccrualError, AccrualFetcher, AccrualResponse, BackoffGate, FetchOutcome,
};
#[cfg(test)]
pub use client::MockAccrualFetcher;
