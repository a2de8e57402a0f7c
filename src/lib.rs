//! # Market Store
//!
//! Overview-maintaining persistence for financial time series: periodic
//! OHLCV bars keyed by (symbol, exchange, interval, time) and tick
//! snapshots keyed by (symbol, exchange, time), plus flat instrument
//! reference metadata.
//!
//! ## Features
//!
//! - **Idempotent bulk writes**: batches land via insert-or-replace on the
//!   natural key, chunked, inside one transaction
//! - **Overview ledger**: every series carries a `{count, start, end}`
//!   summary maintained incrementally on write, with an O(1) fast path for
//!   declared streaming appends and an overlap-safe re-count for backfills
//! - **Self-healing**: a store with records but no overview rows is
//!   reconciled lazily on first listing, or explicitly via the admin CLI
//! - **Range replay**: inclusive time-bounded loads, ascending, in the
//!   configured canonical time zone
//!
//! Concurrent writers across processes are safe: writes to one series are
//! serialized by a Postgres advisory lock for the duration of the
//! transaction.

pub mod config;
pub mod schema;
pub mod storage;
pub mod cli;

// Re-export commonly used types
pub use config::Settings;
pub use schema::{
    BarData, BarOverview, Exchange, Interval, SeriesKey, TickData, TickOverview,
};
pub use storage::{run_migrations, MarketStore, StoreError, StoreResult, SymbolInfo};
