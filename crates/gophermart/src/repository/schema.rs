//! 表结构
//!
//! 启动时通过 `Database::init_schema` 执行，语句均可重复执行。

pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        login VARCHAR(255) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        number TEXT PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        status VARCHAR(16) NOT NULL DEFAULT 'NEW',
        accrual NUMERIC(14, 2) NOT NULL DEFAULT 0 CHECK (accrual >= 0),
        uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        lease_expires_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_orders_pending
        ON orders (uploaded_at)
        WHERE status IN ('NEW', 'PROCESSING')
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id, uploaded_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        user_id BIGINT PRIMARY KEY REFERENCES users(id),
        current NUMERIC(14, 2) NOT NULL DEFAULT 0 CHECK (current >= 0),
        withdrawn NUMERIC(14, 2) NOT NULL DEFAULT 0 CHECK (withdrawn >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS withdrawals (
        order_number TEXT PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        sum NUMERIC(14, 2) NOT NULL CHECK (sum > 0),
        processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawals (user_id, processed_at DESC)
    "#,
    // 订单号长度不设上限，旧库中的 VARCHAR 列放宽为 TEXT
    "ALTER TABLE orders ALTER COLUMN number TYPE TEXT",
    "ALTER TABLE withdrawals ALTER COLUMN order_number TYPE TEXT",
];
