//! The market data store.
//!
//! One `MarketStore` wraps a Postgres pool and implements the
//! overview-maintaining upsert engine: every batch write lands in the raw
//! table and updates the per-series overview row inside a single
//! transaction, serialized per series by an advisory lock so concurrent
//! writers on the same series cannot lose each other's overview update.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::overview::{
    exchange_from_db, interval_from_db, plan_overview_update, series_lock_tag, BatchStats,
    CountPolicy, ExistingOverview,
};
use super::{StoreError, StoreResult};
use crate::config::Settings;
use crate::schema::{
    from_db_time, to_db_time, BarData, BarOverview, Exchange, Interval, TickData, TickOverview,
};

const BAR_COLUMNS: usize = 11;
const TICK_COLUMNS: usize = 36;

/// Postgres-backed store for bars, ticks and their overviews.
#[derive(Clone)]
pub struct MarketStore {
    pool: PgPool,
    tz: Tz,
    batch_size: usize,
}

impl MarketStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool, tz: Tz, batch_size: usize) -> Self {
        Self {
            pool,
            tz,
            batch_size: batch_size.max(1),
        }
    }

    /// Connect and configure from settings.
    pub async fn from_settings(settings: &Settings) -> StoreResult<Self> {
        let tz: Tz = settings.storage.timezone.parse().map_err(|_| {
            StoreError::Configuration(format!(
                "unknown timezone '{}'",
                settings.storage.timezone
            ))
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.database.max_connections)
            .min_connections(settings.database.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&settings.database.url)
            .await?;

        Ok(Self::new(pool, tz, settings.storage.batch_insert_size))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The canonical storage time zone.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    // ========================================================================
    // Upsert engine
    // ========================================================================

    /// Write a batch of bars and update the series overview.
    ///
    /// All bars must belong to the series of the first bar; the batch need
    /// not be sorted. A record whose (series, timestamp) already exists
    /// replaces the stored payload; when the batch itself carries several
    /// records on one timestamp, the last occurrence wins. With `stream = true` the caller asserts
    /// the batch contains only new, chronologically later records, which
    /// allows an O(1) overview update; if the assertion is visibly false
    /// (the batch reaches back into the stored range) the engine re-counts
    /// instead of trusting it.
    pub async fn save_bars(&self, bars: &[BarData], stream: bool) -> StoreResult<()> {
        let first = bars.first().ok_or(StoreError::EmptyBatch)?;
        let key = first.series_key();
        let exchange = first.exchange.as_str();
        let interval = first.interval.as_str();

        let (timestamps, rows) = dedup_last_by_time(bars, |bar| to_db_time(self.tz, bar.datetime));
        let batch = BatchStats::from_timestamps(&timestamps).ok_or(StoreError::EmptyBatch)?;

        let mut tx = self.pool.begin().await?;
        self.lock_series(&mut tx, &series_lock_tag(&key)).await?;

        for (chunk, chunk_ts) in rows
            .chunks(self.batch_size)
            .zip(timestamps.chunks(self.batch_size))
        {
            self.insert_bar_chunk(&mut tx, chunk, chunk_ts).await?;
        }

        let existing = sqlx::query(
            r#"
            SELECT count, "start", "end"
            FROM bar_overview
            WHERE symbol = $1 AND exchange = $2 AND interval = $3
            "#,
        )
        .bind(&key.symbol)
        .bind(exchange)
        .bind(interval)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| ExistingOverview {
            count: row.get("count"),
            start: row.get("start"),
            end: row.get("end"),
        });

        let plan = plan_overview_update(existing, batch, stream);
        let count = match plan.count {
            CountPolicy::Exact(count) => count,
            CountPolicy::Recount => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*)
                    FROM bar_data
                    WHERE symbol = $1 AND exchange = $2 AND interval = $3
                    "#,
                )
                .bind(&key.symbol)
                .bind(exchange)
                .bind(interval)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        sqlx::query(
            r#"
            INSERT INTO bar_overview (symbol, exchange, interval, count, "start", "end")
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (symbol, exchange, interval) DO UPDATE SET
                count = EXCLUDED.count,
                "start" = EXCLUDED."start",
                "end" = EXCLUDED."end"
            "#,
        )
        .bind(&key.symbol)
        .bind(exchange)
        .bind(interval)
        .bind(count)
        .bind(plan.start)
        .bind(plan.end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("Saved {} bar(s) for {} (stream={})", bars.len(), key, stream);
        Ok(())
    }

    /// Write a batch of ticks and update the series overview.
    ///
    /// Same contract as [`save_bars`](Self::save_bars), keyed without an
    /// interval.
    pub async fn save_ticks(&self, ticks: &[TickData], stream: bool) -> StoreResult<()> {
        let first = ticks.first().ok_or(StoreError::EmptyBatch)?;
        let key = first.series_key();
        let exchange = first.exchange.as_str();

        let (timestamps, rows) =
            dedup_last_by_time(ticks, |tick| to_db_time(self.tz, tick.datetime));
        let batch = BatchStats::from_timestamps(&timestamps).ok_or(StoreError::EmptyBatch)?;

        let mut tx = self.pool.begin().await?;
        self.lock_series(&mut tx, &series_lock_tag(&key)).await?;

        for (chunk, chunk_ts) in rows
            .chunks(self.batch_size)
            .zip(timestamps.chunks(self.batch_size))
        {
            self.insert_tick_chunk(&mut tx, chunk, chunk_ts).await?;
        }

        let existing = sqlx::query(
            r#"
            SELECT count, "start", "end"
            FROM tick_overview
            WHERE symbol = $1 AND exchange = $2
            "#,
        )
        .bind(&key.symbol)
        .bind(exchange)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| ExistingOverview {
            count: row.get("count"),
            start: row.get("start"),
            end: row.get("end"),
        });

        let plan = plan_overview_update(existing, batch, stream);
        let count = match plan.count {
            CountPolicy::Exact(count) => count,
            CountPolicy::Recount => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM tick_data WHERE symbol = $1 AND exchange = $2",
                )
                .bind(&key.symbol)
                .bind(exchange)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        sqlx::query(
            r#"
            INSERT INTO tick_overview (symbol, exchange, count, "start", "end")
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (symbol, exchange) DO UPDATE SET
                count = EXCLUDED.count,
                "start" = EXCLUDED."start",
                "end" = EXCLUDED."end"
            "#,
        )
        .bind(&key.symbol)
        .bind(exchange)
        .bind(count)
        .bind(plan.start)
        .bind(plan.end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Saved {} tick(s) for {} (stream={})",
            ticks.len(),
            key,
            stream
        );
        Ok(())
    }

    /// Serialize writers of one series for the duration of the transaction.
    async fn lock_series(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tag: &str,
    ) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(tag)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Insert one chunk of bars with replace-on-conflict semantics.
    async fn insert_bar_chunk(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        bars: &[&BarData],
        timestamps: &[NaiveDateTime],
    ) -> StoreResult<()> {
        let mut query = String::from(
            r#"
            INSERT INTO bar_data (
                symbol, exchange, interval, datetime,
                volume, turnover, open_interest,
                open_price, high_price, low_price, close_price
            ) VALUES
            "#,
        );
        push_placeholder_rows(&mut query, bars.len(), BAR_COLUMNS);
        query.push_str(
            r#"
            ON CONFLICT (symbol, exchange, interval, datetime) DO UPDATE SET
                volume = EXCLUDED.volume,
                turnover = EXCLUDED.turnover,
                open_interest = EXCLUDED.open_interest,
                open_price = EXCLUDED.open_price,
                high_price = EXCLUDED.high_price,
                low_price = EXCLUDED.low_price,
                close_price = EXCLUDED.close_price
            "#,
        );

        let mut sqlx_query = sqlx::query(&query);
        for (bar, ts) in bars.iter().zip(timestamps) {
            sqlx_query = sqlx_query
                .bind(&bar.symbol)
                .bind(bar.exchange.as_str())
                .bind(bar.interval.as_str())
                .bind(ts)
                .bind(bar.volume)
                .bind(bar.turnover)
                .bind(bar.open_interest)
                .bind(bar.open_price)
                .bind(bar.high_price)
                .bind(bar.low_price)
                .bind(bar.close_price);
        }

        sqlx_query.execute(&mut **tx).await?;
        Ok(())
    }

    /// Insert one chunk of ticks with replace-on-conflict semantics.
    async fn insert_tick_chunk(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ticks: &[&TickData],
        timestamps: &[NaiveDateTime],
    ) -> StoreResult<()> {
        let mut query = String::from(
            r#"
            INSERT INTO tick_data (
                symbol, exchange, datetime, name,
                volume, turnover, open_interest,
                last_price, last_volume, limit_up, limit_down,
                open_price, high_price, low_price, pre_close,
                bid_price_1, bid_price_2, bid_price_3, bid_price_4, bid_price_5,
                ask_price_1, ask_price_2, ask_price_3, ask_price_4, ask_price_5,
                bid_volume_1, bid_volume_2, bid_volume_3, bid_volume_4, bid_volume_5,
                ask_volume_1, ask_volume_2, ask_volume_3, ask_volume_4, ask_volume_5,
                "localtime"
            ) VALUES
            "#,
        );
        push_placeholder_rows(&mut query, ticks.len(), TICK_COLUMNS);
        query.push_str(
            r#"
            ON CONFLICT (symbol, exchange, datetime) DO UPDATE SET
                name = EXCLUDED.name,
                volume = EXCLUDED.volume,
                turnover = EXCLUDED.turnover,
                open_interest = EXCLUDED.open_interest,
                last_price = EXCLUDED.last_price,
                last_volume = EXCLUDED.last_volume,
                limit_up = EXCLUDED.limit_up,
                limit_down = EXCLUDED.limit_down,
                open_price = EXCLUDED.open_price,
                high_price = EXCLUDED.high_price,
                low_price = EXCLUDED.low_price,
                pre_close = EXCLUDED.pre_close,
                bid_price_1 = EXCLUDED.bid_price_1,
                bid_price_2 = EXCLUDED.bid_price_2,
                bid_price_3 = EXCLUDED.bid_price_3,
                bid_price_4 = EXCLUDED.bid_price_4,
                bid_price_5 = EXCLUDED.bid_price_5,
                ask_price_1 = EXCLUDED.ask_price_1,
                ask_price_2 = EXCLUDED.ask_price_2,
                ask_price_3 = EXCLUDED.ask_price_3,
                ask_price_4 = EXCLUDED.ask_price_4,
                ask_price_5 = EXCLUDED.ask_price_5,
                bid_volume_1 = EXCLUDED.bid_volume_1,
                bid_volume_2 = EXCLUDED.bid_volume_2,
                bid_volume_3 = EXCLUDED.bid_volume_3,
                bid_volume_4 = EXCLUDED.bid_volume_4,
                bid_volume_5 = EXCLUDED.bid_volume_5,
                ask_volume_1 = EXCLUDED.ask_volume_1,
                ask_volume_2 = EXCLUDED.ask_volume_2,
                ask_volume_3 = EXCLUDED.ask_volume_3,
                ask_volume_4 = EXCLUDED.ask_volume_4,
                ask_volume_5 = EXCLUDED.ask_volume_5,
                "localtime" = EXCLUDED."localtime"
            "#,
        );

        let mut sqlx_query = sqlx::query(&query);
        for (tick, ts) in ticks.iter().zip(timestamps) {
            sqlx_query = sqlx_query
                .bind(&tick.symbol)
                .bind(tick.exchange.as_str())
                .bind(ts)
                .bind(&tick.name)
                .bind(tick.volume)
                .bind(tick.turnover)
                .bind(tick.open_interest)
                .bind(tick.last_price)
                .bind(tick.last_volume)
                .bind(tick.limit_up)
                .bind(tick.limit_down)
                .bind(tick.open_price)
                .bind(tick.high_price)
                .bind(tick.low_price)
                .bind(tick.pre_close)
                .bind(tick.bid_price_1)
                .bind(tick.bid_price_2)
                .bind(tick.bid_price_3)
                .bind(tick.bid_price_4)
                .bind(tick.bid_price_5)
                .bind(tick.ask_price_1)
                .bind(tick.ask_price_2)
                .bind(tick.ask_price_3)
                .bind(tick.ask_price_4)
                .bind(tick.ask_price_5)
                .bind(tick.bid_volume_1)
                .bind(tick.bid_volume_2)
                .bind(tick.bid_volume_3)
                .bind(tick.bid_volume_4)
                .bind(tick.bid_volume_5)
                .bind(tick.ask_volume_1)
                .bind(tick.ask_volume_2)
                .bind(tick.ask_volume_3)
                .bind(tick.ask_volume_4)
                .bind(tick.ask_volume_5)
                .bind(tick.localtime.map(|lt| to_db_time(self.tz, lt)));
        }

        sqlx_query.execute(&mut **tx).await?;
        Ok(())
    }

    // ========================================================================
    // Range reader
    // ========================================================================

    /// Load bars for one series in `[start, end]`, ascending by timestamp.
    pub async fn load_bars(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<BarData>> {
        let rows = sqlx::query(
            r#"
            SELECT datetime, volume, turnover, open_interest,
                   open_price, high_price, low_price, close_price
            FROM bar_data
            WHERE symbol = $1 AND exchange = $2 AND interval = $3
              AND datetime >= $4 AND datetime <= $5
            ORDER BY datetime ASC
            "#,
        )
        .bind(symbol)
        .bind(exchange.as_str())
        .bind(interval.as_str())
        .bind(to_db_time(self.tz, start))
        .bind(to_db_time(self.tz, end))
        .fetch_all(&self.pool)
        .await?;

        let bars = rows
            .into_iter()
            .map(|row| BarData {
                symbol: symbol.to_string(),
                exchange,
                interval,
                datetime: from_db_time(self.tz, row.get("datetime")),
                volume: row.get("volume"),
                turnover: row.get("turnover"),
                open_interest: row.get("open_interest"),
                open_price: row.get("open_price"),
                high_price: row.get("high_price"),
                low_price: row.get("low_price"),
                close_price: row.get("close_price"),
            })
            .collect::<Vec<_>>();

        debug!(
            "Loaded {} bar(s) for {}.{}/{}",
            bars.len(),
            symbol,
            exchange,
            interval
        );
        Ok(bars)
    }

    /// Load ticks for one series in `[start, end]`, ascending by timestamp.
    pub async fn load_ticks(
        &self,
        symbol: &str,
        exchange: Exchange,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<TickData>> {
        let rows = sqlx::query(
            r#"
            SELECT datetime, name, volume, turnover, open_interest,
                   last_price, last_volume, limit_up, limit_down,
                   open_price, high_price, low_price, pre_close,
                   bid_price_1, bid_price_2, bid_price_3, bid_price_4, bid_price_5,
                   ask_price_1, ask_price_2, ask_price_3, ask_price_4, ask_price_5,
                   bid_volume_1, bid_volume_2, bid_volume_3, bid_volume_4, bid_volume_5,
                   ask_volume_1, ask_volume_2, ask_volume_3, ask_volume_4, ask_volume_5,
                   "localtime"
            FROM tick_data
            WHERE symbol = $1 AND exchange = $2
              AND datetime >= $3 AND datetime <= $4
            ORDER BY datetime ASC
            "#,
        )
        .bind(symbol)
        .bind(exchange.as_str())
        .bind(to_db_time(self.tz, start))
        .bind(to_db_time(self.tz, end))
        .fetch_all(&self.pool)
        .await?;

        let ticks = rows
            .into_iter()
            .map(|row| TickData {
                symbol: symbol.to_string(),
                exchange,
                datetime: from_db_time(self.tz, row.get("datetime")),
                name: row.get("name"),
                volume: row.get("volume"),
                turnover: row.get("turnover"),
                open_interest: row.get("open_interest"),
                last_price: row.get("last_price"),
                last_volume: row.get("last_volume"),
                limit_up: row.get("limit_up"),
                limit_down: row.get("limit_down"),
                open_price: row.get("open_price"),
                high_price: row.get("high_price"),
                low_price: row.get("low_price"),
                pre_close: row.get("pre_close"),
                bid_price_1: row.get("bid_price_1"),
                bid_price_2: row.get("bid_price_2"),
                bid_price_3: row.get("bid_price_3"),
                bid_price_4: row.get("bid_price_4"),
                bid_price_5: row.get("bid_price_5"),
                ask_price_1: row.get("ask_price_1"),
                ask_price_2: row.get("ask_price_2"),
                ask_price_3: row.get("ask_price_3"),
                ask_price_4: row.get("ask_price_4"),
                ask_price_5: row.get("ask_price_5"),
                bid_volume_1: row.get("bid_volume_1"),
                bid_volume_2: row.get("bid_volume_2"),
                bid_volume_3: row.get("bid_volume_3"),
                bid_volume_4: row.get("bid_volume_4"),
                bid_volume_5: row.get("bid_volume_5"),
                ask_volume_1: row.get("ask_volume_1"),
                ask_volume_2: row.get("ask_volume_2"),
                ask_volume_3: row.get("ask_volume_3"),
                ask_volume_4: row.get("ask_volume_4"),
                ask_volume_5: row.get("ask_volume_5"),
                localtime: row
                    .get::<Option<NaiveDateTime>, _>("localtime")
                    .map(|lt| from_db_time(self.tz, lt)),
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} tick(s) for {}.{}", ticks.len(), symbol, exchange);
        Ok(ticks)
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete all bars of one series and its overview row. Returns the
    /// number of deleted bars; a series with no data returns 0 and leaves
    /// nothing behind.
    pub async fn delete_bars(
        &self,
        symbol: &str,
        exchange: Exchange,
        interval: Interval,
    ) -> StoreResult<u64> {
        let key = crate::schema::SeriesKey::bar(symbol, exchange, interval);

        let mut tx = self.pool.begin().await?;
        self.lock_series(&mut tx, &series_lock_tag(&key)).await?;

        let deleted = sqlx::query(
            "DELETE FROM bar_data WHERE symbol = $1 AND exchange = $2 AND interval = $3",
        )
        .bind(symbol)
        .bind(exchange.as_str())
        .bind(interval.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            "DELETE FROM bar_overview WHERE symbol = $1 AND exchange = $2 AND interval = $3",
        )
        .bind(symbol)
        .bind(exchange.as_str())
        .bind(interval.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Deleted {} bar(s) for {}.{}/{}",
            deleted, symbol, exchange, interval
        );
        Ok(deleted)
    }

    /// Delete all ticks of one series and its overview row.
    pub async fn delete_ticks(&self, symbol: &str, exchange: Exchange) -> StoreResult<u64> {
        let key = crate::schema::SeriesKey::tick(symbol, exchange);

        let mut tx = self.pool.begin().await?;
        self.lock_series(&mut tx, &series_lock_tag(&key)).await?;

        let deleted = sqlx::query("DELETE FROM tick_data WHERE symbol = $1 AND exchange = $2")
            .bind(symbol)
            .bind(exchange.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM tick_overview WHERE symbol = $1 AND exchange = $2")
            .bind(symbol)
            .bind(exchange.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!("Deleted {} tick(s) for {}.{}", deleted, symbol, exchange);
        Ok(deleted)
    }

    // ========================================================================
    // Overview listings
    // ========================================================================

    /// List every bar series overview.
    ///
    /// A store that has bar rows but no overview rows (populated before
    /// this engine governed it) is reconciled first.
    pub async fn bar_overviews(&self) -> StoreResult<Vec<BarOverview>> {
        self.heal_overviews_if_missing("bar_data", "bar_overview", None, false)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT symbol, exchange, interval, count, "start", "end"
            FROM bar_overview
            ORDER BY symbol, exchange, interval
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(BarOverview {
                    symbol: row.get("symbol"),
                    exchange: exchange_from_db(row.get::<&str, _>("exchange"))?,
                    interval: interval_from_db(row.get::<&str, _>("interval"))?,
                    count: row.get("count"),
                    start: from_db_time(self.tz, row.get("start")),
                    end: from_db_time(self.tz, row.get("end")),
                })
            })
            .collect()
    }

    /// List every tick series overview, self-healing like
    /// [`bar_overviews`](Self::bar_overviews).
    pub async fn tick_overviews(&self) -> StoreResult<Vec<TickOverview>> {
        self.heal_overviews_if_missing("tick_data", "tick_overview", None, true)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT symbol, exchange, count, "start", "end"
            FROM tick_overview
            ORDER BY symbol, exchange
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(TickOverview {
                    symbol: row.get("symbol"),
                    exchange: exchange_from_db(row.get::<&str, _>("exchange"))?,
                    count: row.get("count"),
                    start: from_db_time(self.tz, row.get("start")),
                    end: from_db_time(self.tz, row.get("end")),
                })
            })
            .collect()
    }
}

/// Collapse records sharing a normalized timestamp, keeping the last
/// occurrence. A multi-row `ON CONFLICT DO UPDATE` may not touch the same
/// key twice within one statement, so each chunk must carry one row per
/// timestamp. Returns timestamps and surviving records in ascending time
/// order.
pub(crate) fn dedup_last_by_time<T>(
    records: &[T],
    mut db_time: impl FnMut(&T) -> NaiveDateTime,
) -> (Vec<NaiveDateTime>, Vec<&T>) {
    let mut keep: BTreeMap<NaiveDateTime, &T> = BTreeMap::new();
    for record in records {
        keep.insert(db_time(record), record);
    }
    keep.into_iter().unzip()
}

/// Append `rows` placeholder tuples of `columns` parameters each:
/// `($1, $2, ...), ($N+1, ...), ...`.
pub(crate) fn push_placeholder_rows(query: &mut String, rows: usize, columns: usize) {
    let mut param = 1;
    for row in 0..rows {
        if row > 0 {
            query.push_str(", ");
        }
        query.push('(');
        for col in 0..columns {
            if col > 0 {
                query.push_str(", ");
            }
            query.push('$');
            query.push_str(&param.to_string());
            param += 1;
        }
        query.push(')');
    }
}
