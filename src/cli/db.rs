//! Database administration commands

use anyhow::{anyhow, Result};
use clap::Args;
use tracing::info;

use crate::config::Settings;
use crate::schema::{Exchange, Interval, SeriesKey};
use crate::storage::{run_migrations, MarketStore};

/// Arguments for the overview command
#[derive(Args)]
pub struct OverviewArgs {
    /// List tick overviews instead of bar overviews
    #[arg(long)]
    pub ticks: bool,
}

/// Arguments for the rebuild command
#[derive(Args)]
pub struct RebuildArgs {
    /// Rebuild tick overviews instead of bar overviews
    #[arg(long)]
    pub ticks: bool,

    /// Restrict to one symbol (requires --exchange)
    #[arg(long)]
    pub symbol: Option<String>,

    /// Exchange code, e.g. SHFE
    #[arg(long)]
    pub exchange: Option<String>,

    /// Interval code for bar series, e.g. 1m
    #[arg(long)]
    pub interval: Option<String>,
}

/// Arguments for the delete command
#[derive(Args)]
pub struct DeleteArgs {
    /// Delete a tick series instead of a bar series
    #[arg(long)]
    pub ticks: bool,

    /// Symbol to delete
    #[arg(long)]
    pub symbol: String,

    /// Exchange code, e.g. SHFE
    #[arg(long)]
    pub exchange: String,

    /// Interval code for bar series, e.g. 1m
    #[arg(long)]
    pub interval: Option<String>,
}

async fn connect() -> Result<MarketStore> {
    let settings = Settings::load()?;
    Ok(MarketStore::from_settings(&settings).await?)
}

fn parse_exchange(code: &str) -> Result<Exchange> {
    Exchange::from_str(code).ok_or_else(|| anyhow!("unknown exchange code '{code}'"))
}

fn parse_interval(code: &str) -> Result<Interval> {
    Interval::from_str(code).ok_or_else(|| anyhow!("unknown interval code '{code}'"))
}

/// Run migrations.
pub async fn migrate() -> Result<()> {
    let store = connect().await?;
    run_migrations(store.pool()).await?;
    Ok(())
}

/// List overviews.
pub async fn overview(args: OverviewArgs) -> Result<()> {
    let store = connect().await?;

    if args.ticks {
        let overviews = store.tick_overviews().await?;
        println!("{} tick series", overviews.len());
        for o in overviews {
            println!(
                "{}.{}  count={}  start={}  end={}",
                o.symbol, o.exchange, o.count, o.start, o.end
            );
        }
    } else {
        let overviews = store.bar_overviews().await?;
        println!("{} bar series", overviews.len());
        for o in overviews {
            println!(
                "{}.{}/{}  count={}  start={}  end={}",
                o.symbol, o.exchange, o.interval, o.count, o.start, o.end
            );
        }
    }

    Ok(())
}

/// Rebuild overview rows from the raw tables.
pub async fn rebuild(args: RebuildArgs) -> Result<()> {
    let store = connect().await?;

    let filter = match (&args.symbol, &args.exchange) {
        (Some(symbol), Some(exchange)) => {
            let exchange = parse_exchange(exchange)?;
            let interval = match (&args.interval, args.ticks) {
                (Some(code), false) => Some(parse_interval(code)?),
                (Some(_), true) => return Err(anyhow!("--interval does not apply to ticks")),
                (None, false) => return Err(anyhow!("bar filter requires --interval")),
                (None, true) => None,
            };
            Some(SeriesKey {
                symbol: symbol.clone(),
                exchange,
                interval,
            })
        }
        (None, None) => None,
        _ => return Err(anyhow!("--symbol and --exchange must be given together")),
    };

    if args.ticks {
        store.rebuild_tick_overviews(filter.as_ref()).await?;
    } else {
        store.rebuild_bar_overviews(filter.as_ref()).await?;
    }

    info!("Rebuild complete");
    Ok(())
}

/// Delete one series and its overview row.
pub async fn delete(args: DeleteArgs) -> Result<()> {
    let store = connect().await?;
    let exchange = parse_exchange(&args.exchange)?;

    let deleted = if args.ticks {
        store.delete_ticks(&args.symbol, exchange).await?
    } else {
        let interval = args
            .interval
            .as_deref()
            .ok_or_else(|| anyhow!("bar series require --interval"))?;
        store
            .delete_bars(&args.symbol, exchange, parse_interval(interval)?)
            .await?
    };

    println!("Deleted {} record(s)", deleted);
    Ok(())
}
