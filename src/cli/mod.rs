//! Command-line interface
//!
//! Administrative commands for the market store.

pub mod db;

use clap::{Parser, Subcommand};

/// Market Store CLI
#[derive(Parser)]
#[command(name = "market-store")]
#[command(about = "Overview-maintaining market data store administration")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create tables and indexes
    Migrate,
    /// List series overviews
    Overview(db::OverviewArgs),
    /// Rebuild overview rows from raw data
    Rebuild(db::RebuildArgs),
    /// Delete all records of one series
    Delete(db::DeleteArgs),
}
