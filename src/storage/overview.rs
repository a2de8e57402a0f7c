//! Overview update policy and reconciliation.
//!
//! The overview ledger holds one `{count, start, end}` row per series. On
//! every batch write the engine picks one of three update policies
//! (first-write, streaming append, backfill re-count); this module holds
//! that decision as a pure function plus the from-scratch reconciler that
//! rebuilds the ledger out of the raw tables.

use chrono::NaiveDateTime;
use sqlx::Row;
use std::collections::BTreeSet;
use tracing::info;

use super::{MarketStore, StoreError, StoreResult};
use crate::schema::{Exchange, Interval, SeriesKey};

/// Time profile of one incoming batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchStats {
    /// Number of distinct timestamps in the batch. Colliding timestamps
    /// collapse to one stored row, so raw length would overcount.
    pub distinct: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl BatchStats {
    /// Scan a batch's normalized timestamps. Returns `None` for an empty
    /// batch.
    pub fn from_timestamps(timestamps: &[NaiveDateTime]) -> Option<Self> {
        let set: BTreeSet<NaiveDateTime> = timestamps.iter().copied().collect();
        let start = *set.first()?;
        let end = *set.last()?;
        Some(Self {
            distinct: set.len() as i64,
            start,
            end,
        })
    }
}

/// Overview row as currently stored, before the batch is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExistingOverview {
    pub count: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// How the new `count` is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CountPolicy {
    /// Arithmetic on known quantities; no store read.
    Exact(i64),
    /// Authoritative `COUNT(*)` against the raw table, inside the same
    /// transaction as the batch write.
    Recount,
}

/// The planned overview row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OverviewPlan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub count: CountPolicy,
}

/// Decide how the overview row changes for one batch.
///
/// - First write for the series: the batch alone defines the overview.
/// - `stream` asserted and the batch truly starts after the stored `end`:
///   O(1) append arithmetic.
/// - Everything else, including a mis-declared stream hint: overlap-safe
///   merge with an authoritative re-count.
///
/// The strictly-later guard on the streaming path means a caller that
/// mislabels a backfill as streaming gets a correct (slower) write instead
/// of a silently corrupted count.
pub(crate) fn plan_overview_update(
    existing: Option<ExistingOverview>,
    batch: BatchStats,
    stream: bool,
) -> OverviewPlan {
    match existing {
        None => OverviewPlan {
            start: batch.start,
            end: batch.end,
            count: CountPolicy::Exact(batch.distinct),
        },
        Some(current) if stream && batch.start > current.end => OverviewPlan {
            start: current.start,
            end: batch.end,
            count: CountPolicy::Exact(current.count + batch.distinct),
        },
        Some(current) => OverviewPlan {
            start: current.start.min(batch.start),
            end: current.end.max(batch.end),
            count: CountPolicy::Recount,
        },
    }
}

impl MarketStore {
    /// Rebuild bar overview rows from the raw bar table.
    ///
    /// With `filter` set, only that series is rebuilt; otherwise every
    /// series present in `bar_data` gets a fresh overview row. Existing
    /// rows are overwritten, rows for absent series are left alone. A
    /// filter without an interval cannot name a bar series and is rejected.
    pub async fn rebuild_bar_overviews(&self, filter: Option<&SeriesKey>) -> StoreResult<()> {
        let mut sql = String::from(
            r#"
            SELECT symbol, exchange, interval,
                   COUNT(*) AS count,
                   MIN(datetime) AS "start",
                   MAX(datetime) AS "end"
            FROM bar_data
            "#,
        );
        if filter.is_some() {
            sql.push_str("WHERE symbol = $1 AND exchange = $2 AND interval = $3\n");
        }
        sql.push_str("GROUP BY symbol, exchange, interval");

        let mut query = sqlx::query(&sql);
        if let Some(key) = filter {
            let interval = key.interval.ok_or_else(|| {
                StoreError::InvalidData(format!("bar series filter '{key}' has no interval"))
            })?;
            query = query
                .bind(&key.symbol)
                .bind(key.exchange.as_str())
                .bind(interval.as_str());
        }

        let groups = query.fetch_all(self.pool()).await?;
        let rebuilt = groups.len();

        for group in groups {
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
            .bind(group.get::<String, _>("symbol"))
            .bind(group.get::<String, _>("exchange"))
            .bind(group.get::<String, _>("interval"))
            .bind(group.get::<i64, _>("count"))
            .bind(group.get::<NaiveDateTime, _>("start"))
            .bind(group.get::<NaiveDateTime, _>("end"))
            .execute(self.pool())
            .await?;
        }

        info!("Rebuilt {} bar overview row(s)", rebuilt);
        Ok(())
    }

    /// Rebuild tick overview rows from the raw tick table.
    pub async fn rebuild_tick_overviews(&self, filter: Option<&SeriesKey>) -> StoreResult<()> {
        let mut sql = String::from(
            r#"
            SELECT symbol, exchange,
                   COUNT(*) AS count,
                   MIN(datetime) AS "start",
                   MAX(datetime) AS "end"
            FROM tick_data
            "#,
        );
        if filter.is_some() {
            sql.push_str("WHERE symbol = $1 AND exchange = $2\n");
        }
        sql.push_str("GROUP BY symbol, exchange");

        let mut query = sqlx::query(&sql);
        if let Some(key) = filter {
            query = query.bind(&key.symbol).bind(key.exchange.as_str());
        }

        let groups = query.fetch_all(self.pool()).await?;
        let rebuilt = groups.len();

        for group in groups {
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
            .bind(group.get::<String, _>("symbol"))
            .bind(group.get::<String, _>("exchange"))
            .bind(group.get::<i64, _>("count"))
            .bind(group.get::<NaiveDateTime, _>("start"))
            .bind(group.get::<NaiveDateTime, _>("end"))
            .execute(self.pool())
            .await?;
        }

        info!("Rebuilt {} tick overview row(s)", rebuilt);
        Ok(())
    }

    /// Reconcile a ledger that has raw rows but no overview rows at all.
    ///
    /// The listing paths call this before returning, so a store populated
    /// before overview governance heals itself on first listing.
    pub(crate) async fn heal_overviews_if_missing(
        &self,
        data_table: &str,
        overview_table: &str,
        filter: Option<&SeriesKey>,
        ticks: bool,
    ) -> StoreResult<()> {
        let data_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {data_table}"))
            .fetch_one(self.pool())
            .await?;
        let overview_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {overview_table}"))
                .fetch_one(self.pool())
                .await?;

        if data_count > 0 && overview_count == 0 {
            info!(
                "{} has {} row(s) but {} is empty, reconciling",
                data_table, data_count, overview_table
            );
            if ticks {
                self.rebuild_tick_overviews(filter).await?;
            } else {
                self.rebuild_bar_overviews(filter).await?;
            }
        }
        Ok(())
    }
}

/// Advisory lock tag serializing writers of one series.
pub(crate) fn series_lock_tag(key: &SeriesKey) -> String {
    match key.interval {
        Some(_) => format!("bar:{key}"),
        None => format!("tick:{key}"),
    }
}

pub(crate) fn exchange_from_db(code: &str) -> StoreResult<Exchange> {
    Exchange::from_str(code)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown exchange code '{code}'")))
}

pub(crate) fn interval_from_db(code: &str) -> StoreResult<Interval> {
    Interval::from_str(code)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown interval code '{code}'")))
}
