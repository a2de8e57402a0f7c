//! Market Store admin CLI
//!
//! Provides commands for:
//! - `migrate`: create tables and indexes
//! - `overview`: list series overviews
//! - `rebuild`: rebuild overview rows from raw data
//! - `delete`: delete one series

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_store::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("market_store=info".parse()?))
        .init();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    match cli.command {
        Commands::Migrate => {
            market_store::cli::db::migrate().await?;
        }
        Commands::Overview(args) => {
            market_store::cli::db::overview(args).await?;
        }
        Commands::Rebuild(args) => {
            market_store::cli::db::rebuild(args).await?;
        }
        Commands::Delete(args) => {
            market_store::cli::db::delete(args).await?;
        }
    }

    Ok(())
}
