//! 密码哈希
//!
//! bcrypt 的成本因子来自配置，测试中可调低以加快速度。

use crate::error::ApiError;

/// 生成 bcrypt 哈希
pub fn hash_password(password: &str, cost: u32) -> Result<String, ApiError> {
    bcrypt::hash(password, cost).map_err(|e| ApiError::Internal(format!("密码哈希失败: {}", e)))
}

/// 校验明文密码；哈希格式损坏时返回内部错误而非“密码错误”
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash).map_err(|e| ApiError::Internal(format!("密码验证失败: {}", e)))
}
