//! Schema bootstrap.
//!
//! Idempotent DDL for the two record tables, their overview tables and the
//! instrument reference table. The unique natural-key indexes are what
//! make insert-or-replace well-defined.

use sqlx::PgPool;
use tracing::info;

use super::StoreResult;

/// Create all tables and indexes if they do not exist yet.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    info!("Running market store migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bar_data (
            id BIGSERIAL PRIMARY KEY,
            symbol VARCHAR(64) NOT NULL,
            exchange VARCHAR(16) NOT NULL,
            interval VARCHAR(8) NOT NULL,
            datetime TIMESTAMP NOT NULL,
            volume NUMERIC(28, 8) NOT NULL,
            turnover NUMERIC(28, 8) NOT NULL,
            open_interest NUMERIC(28, 8) NOT NULL,
            open_price NUMERIC(28, 8) NOT NULL,
            high_price NUMERIC(28, 8) NOT NULL,
            low_price NUMERIC(28, 8) NOT NULL,
            close_price NUMERIC(28, 8) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_bar_data_key
        ON bar_data (symbol, exchange, interval, datetime)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tick_data (
            id BIGSERIAL PRIMARY KEY,
            symbol VARCHAR(64) NOT NULL,
            exchange VARCHAR(16) NOT NULL,
            datetime TIMESTAMP(3) NOT NULL,
            name VARCHAR(64) NOT NULL,
            volume NUMERIC(28, 8) NOT NULL,
            turnover NUMERIC(28, 8) NOT NULL,
            open_interest NUMERIC(28, 8) NOT NULL,
            last_price NUMERIC(28, 8) NOT NULL,
            last_volume NUMERIC(28, 8) NOT NULL,
            limit_up NUMERIC(28, 8) NOT NULL,
            limit_down NUMERIC(28, 8) NOT NULL,
            open_price NUMERIC(28, 8) NOT NULL,
            high_price NUMERIC(28, 8) NOT NULL,
            low_price NUMERIC(28, 8) NOT NULL,
            pre_close NUMERIC(28, 8) NOT NULL,
            bid_price_1 NUMERIC(28, 8) NOT NULL,
            bid_price_2 NUMERIC(28, 8),
            bid_price_3 NUMERIC(28, 8),
            bid_price_4 NUMERIC(28, 8),
            bid_price_5 NUMERIC(28, 8),
            ask_price_1 NUMERIC(28, 8) NOT NULL,
            ask_price_2 NUMERIC(28, 8),
            ask_price_3 NUMERIC(28, 8),
            ask_price_4 NUMERIC(28, 8),
            ask_price_5 NUMERIC(28, 8),
            bid_volume_1 NUMERIC(28, 8) NOT NULL,
            bid_volume_2 NUMERIC(28, 8),
            bid_volume_3 NUMERIC(28, 8),
            bid_volume_4 NUMERIC(28, 8),
            bid_volume_5 NUMERIC(28, 8),
            ask_volume_1 NUMERIC(28, 8) NOT NULL,
            ask_volume_2 NUMERIC(28, 8),
            ask_volume_3 NUMERIC(28, 8),
            ask_volume_4 NUMERIC(28, 8),
            ask_volume_5 NUMERIC(28, 8),
            "localtime" TIMESTAMP(3)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tick_data_key
        ON tick_data (symbol, exchange, datetime)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bar_overview (
            id BIGSERIAL PRIMARY KEY,
            symbol VARCHAR(64) NOT NULL,
            exchange VARCHAR(16) NOT NULL,
            interval VARCHAR(8) NOT NULL,
            count BIGINT NOT NULL,
            "start" TIMESTAMP NOT NULL,
            "end" TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_bar_overview_key
        ON bar_overview (symbol, exchange, interval)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tick_overview (
            id BIGSERIAL PRIMARY KEY,
            symbol VARCHAR(64) NOT NULL,
            exchange VARCHAR(16) NOT NULL,
            count BIGINT NOT NULL,
            "start" TIMESTAMP(3) NOT NULL,
            "end" TIMESTAMP(3) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tick_overview_key
        ON tick_overview (symbol, exchange)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS symbol_info (
            id BIGSERIAL PRIMARY KEY,
            symbol VARCHAR(64) NOT NULL,
            exchange VARCHAR(16) NOT NULL,
            sec_id VARCHAR(64) NOT NULL,
            sec_name VARCHAR(128),
            security_type VARCHAR(16),
            price_tick NUMERIC(18, 8),
            listed_date TIMESTAMP,
            delisted_date TIMESTAMP,
            underlying_symbol VARCHAR(64),
            option_type VARCHAR(16)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_symbol_info_key
        ON symbol_info (symbol, exchange)
        "#,
    )
    .execute(pool)
    .await?;

    info!("Market store migrations complete");
    Ok(())
}
