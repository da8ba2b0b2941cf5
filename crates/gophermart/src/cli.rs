//! 命令行参数
//!
//! 优先级最高的一层配置，覆盖配置文件与环境变量

use clap::Parser;
use loyalty_shared::config::AppConfig;

/// Gophermart 积分系统
#[derive(Debug, Default, Parser)]
#[command(name = "gophermart", version, about = "Gophermart 积分系统")]
pub struct Cli {
    /// 服务监听地址
    #[arg(short = 'a', long = "address")]
    pub address: Option<String>,

    /// PostgreSQL 连接串
    #[arg(short = 'd', long = "database-uri")]
    pub database_uri: Option<String>,

    /// 积分计算系统地址
    #[arg(short = 'r', long = "accrual-address")]
    pub accrual_address: Option<String>,
}

impl Cli {
    /// 把命令行中出现的参数覆盖到配置上
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(addr) = non_empty(&self.address) {
            config.server.address = addr;
        }
        if let Some(uri) = non_empty(&self.database_uri) {
            config.database.url = uri;
        }
        if let Some(addr) = non_empty(&self.accrual_address) {
            config.accrual.base_url = addr;
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
