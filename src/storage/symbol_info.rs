//! Instrument reference metadata.
//!
//! A flat keyed table with no derived aggregate: plain chunked upsert,
//! filtered lookup and guarded delete. Deliberately outside the overview
//! machinery.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::debug;

use super::overview::exchange_from_db;
use super::{MarketStore, StoreResult};
use crate::schema::{from_db_time, to_db_time, Exchange};

const SYMBOL_INFO_CHUNK: usize = 100;

/// Reference metadata for one tradable instrument, keyed by
/// (symbol, exchange).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub exchange: Exchange,
    /// Exchange-native instrument identifier.
    pub sec_id: String,
    pub sec_name: Option<String>,
    /// Instrument class, e.g. "FUT", "OPT", "STK".
    pub security_type: Option<String>,
    pub price_tick: Option<Decimal>,
    pub listed_date: Option<DateTime<Utc>>,
    pub delisted_date: Option<DateTime<Utc>>,
    /// Underlying symbol, for derivatives.
    pub underlying_symbol: Option<String>,
    /// Option exercise style, for options.
    pub option_type: Option<String>,
}

impl MarketStore {
    /// Upsert instrument reference rows. An empty slice is a no-op.
    pub async fn save_symbol_infos(&self, infos: &[SymbolInfo]) -> StoreResult<()> {
        if infos.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;

        for chunk in infos.chunks(SYMBOL_INFO_CHUNK) {
            let mut sql = String::from(
                r#"
                INSERT INTO symbol_info (
                    symbol, exchange, sec_id, sec_name, security_type,
                    price_tick, listed_date, delisted_date,
                    underlying_symbol, option_type
                ) VALUES
                "#,
            );
            super::repository::push_placeholder_rows(&mut sql, chunk.len(), 10);
            sql.push_str(
                r#"
                ON CONFLICT (symbol, exchange) DO UPDATE SET
                    sec_id = EXCLUDED.sec_id,
                    sec_name = EXCLUDED.sec_name,
                    security_type = EXCLUDED.security_type,
                    price_tick = EXCLUDED.price_tick,
                    listed_date = EXCLUDED.listed_date,
                    delisted_date = EXCLUDED.delisted_date,
                    underlying_symbol = EXCLUDED.underlying_symbol,
                    option_type = EXCLUDED.option_type
                "#,
            );

            let mut query = sqlx::query(&sql);
            for info in chunk {
                query = query
                    .bind(&info.symbol)
                    .bind(info.exchange.as_str())
                    .bind(&info.sec_id)
                    .bind(&info.sec_name)
                    .bind(&info.security_type)
                    .bind(info.price_tick)
                    .bind(info.listed_date.map(|dt| to_db_time(self.timezone(), dt)))
                    .bind(info.delisted_date.map(|dt| to_db_time(self.timezone(), dt)))
                    .bind(&info.underlying_symbol)
                    .bind(&info.option_type);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!("Saved {} symbol info row(s)", infos.len());
        Ok(())
    }

    /// Look up instrument reference rows, optionally filtered by symbol
    /// and/or exchange.
    pub async fn load_symbol_infos(
        &self,
        symbol: Option<&str>,
        exchange: Option<Exchange>,
    ) -> StoreResult<Vec<SymbolInfo>> {
        let mut sql = String::from(
            r#"
            SELECT symbol, exchange, sec_id, sec_name, security_type,
                   price_tick, listed_date, delisted_date,
                   underlying_symbol, option_type
            FROM symbol_info
            "#,
        );
        match (symbol, exchange) {
            (Some(_), Some(_)) => sql.push_str("WHERE symbol = $1 AND exchange = $2\n"),
            (Some(_), None) => sql.push_str("WHERE symbol = $1\n"),
            (None, Some(_)) => sql.push_str("WHERE exchange = $1\n"),
            (None, None) => {}
        }
        sql.push_str("ORDER BY symbol, exchange");

        let mut query = sqlx::query(&sql);
        if let Some(symbol) = symbol {
            query = query.bind(symbol);
        }
        if let Some(exchange) = exchange {
            query = query.bind(exchange.as_str());
        }

        let rows = query.fetch_all(self.pool()).await?;
        rows.into_iter()
            .map(|row| {
                Ok(SymbolInfo {
                    symbol: row.get("symbol"),
                    exchange: exchange_from_db(row.get::<&str, _>("exchange"))?,
                    sec_id: row.get("sec_id"),
                    sec_name: row.get("sec_name"),
                    security_type: row.get("security_type"),
                    price_tick: row.get("price_tick"),
                    listed_date: row
                        .get::<Option<NaiveDateTime>, _>("listed_date")
                        .map(|dt| from_db_time(self.timezone(), dt)),
                    delisted_date: row
                        .get::<Option<NaiveDateTime>, _>("delisted_date")
                        .map(|dt| from_db_time(self.timezone(), dt)),
                    underlying_symbol: row.get("underlying_symbol"),
                    option_type: row.get("option_type"),
                })
            })
            .collect()
    }

    /// Delete instrument reference rows matching the given criteria.
    ///
    /// Refuses to run with no criteria at all (returns 0) so a bug cannot
    /// truncate the table.
    pub async fn delete_symbol_infos(
        &self,
        symbol: Option<&str>,
        exchange: Option<Exchange>,
    ) -> StoreResult<u64> {
        let mut sql = String::from("DELETE FROM symbol_info ");
        match (symbol, exchange) {
            (Some(_), Some(_)) => sql.push_str("WHERE symbol = $1 AND exchange = $2"),
            (Some(_), None) => sql.push_str("WHERE symbol = $1"),
            (None, Some(_)) => sql.push_str("WHERE exchange = $1"),
            (None, None) => return Ok(0),
        }

        let mut query = sqlx::query(&sql);
        if let Some(symbol) = symbol {
            query = query.bind(symbol);
        }
        if let Some(exchange) = exchange {
            query = query.bind(exchange.as_str());
        }

        let deleted = query.execute(self.pool()).await?.rows_affected();
        debug!("Deleted {} symbol info row(s)", deleted);
        Ok(deleted)
    }
}
