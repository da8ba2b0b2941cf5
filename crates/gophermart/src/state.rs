//! 应用状态定义

use std::sync::Arc;

use loyalty_shared::database::Database;

use crate::auth::JwtManager;
use crate::repository::{
    BalanceLedger, LedgerRepository, MemoryStore, OrderRepository, OrderStore, UserRepository,
    UserStore,
};

/// Axum 应用共享状态
///
/// 存储以 trait 对象注入，生产环境使用 PostgreSQL，测试使用内存实现
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderStore>,
    pub ledger: Arc<dyn BalanceLedger>,
    pub users: Arc<dyn UserStore>,
    pub jwt_manager: Arc<JwtManager>,
    /// bcrypt 成本因子
    pub password_cost: u32,
    /// 就绪探针使用；内存模式下为空
    pub database: Option<Database>,
}

impl AppState {
    /// 基于 PostgreSQL 构建
    pub fn with_database(database: Database, jwt_manager: JwtManager, claim_lease_seconds: i64) -> Self {
        let pool = database.pool().clone();
        Self {
            orders: Arc::new(OrderRepository::new(pool.clone(), claim_lease_seconds)),
            ledger: Arc::new(LedgerRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool)),
            jwt_manager: Arc::new(jwt_manager),
            password_cost: bcrypt::DEFAULT_COST,
            database: Some(database),
        }
    }

    /// 基于内存存储构建
    pub fn in_memory(store: MemoryStore, jwt_manager: JwtManager) -> Self {
        Self {
            orders: Arc::new(store.clone()),
            ledger: Arc::new(store.clone()),
            users: Arc::new(store),
            jwt_manager: Arc::new(jwt_manager),
            password_cost: bcrypt::DEFAULT_COST,
            database: None,
        }
    }

    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }
}
