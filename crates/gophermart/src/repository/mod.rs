//! 仓储层
//!
//! PostgreSQL 实现用于生产，DashMap 内存实现用于测试与本地开发，二者满足相同的并发契约。

mod ledger_repo;
mod memory;
mod order_repo;
mod schema;
mod traits;
mod user_repo;

pub use ledger_repo::LedgerRepository;
pub use memory::MemoryStore;
pub use order_repo::OrderRepository;
pub use schema::SCHEMA_STATEMENTS;
pub use traits::{BalanceLedger, OrderStore, UserStore};
#[cfg(test)]
pub use traits::{MockBalanceLedger, MockOrderStore, MockUserStore};
pub use user_repo::UserRepository;
