//! Postgres-backed market data store
//!
//! Provides the overview-maintaining upsert engine for bars and ticks,
//! bounded range reads, series deletion, overview reconciliation and the
//! flat instrument reference table.

mod migrations;
mod overview;
mod repository;
mod symbol_info;

pub use migrations::*;
pub use repository::*;
pub use symbol_info::*;

use std::time::Duration;
use thiserror::Error;

/// Store errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Empty batch")]
    EmptyBatch,

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Whether the caller may reasonably retry the whole operation.
    ///
    /// True only for connection-level failures; the failed transaction has
    /// rolled back, so a retry resubmits the full batch.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    /// Suggested delay before a retry, for retryable errors.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        if self.is_retryable() {
            Some(Duration::from_millis(500))
        } else {
            None
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
