//! Canonical market data types
//!
//! All data entering or leaving the store is expressed in these types.
//! Timestamps in the public API are UTC; the storage layer normalizes them
//! into the configured canonical time zone on the way in and reinterprets
//! them on the way out.

mod conversion;
mod market_data;

pub use conversion::*;
pub use market_data::*;
