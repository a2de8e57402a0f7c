//! Bar, tick and overview types plus the series key that identifies one
//! logical time series.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange/venue code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    // China futures/commodities
    Cffex,
    Shfe,
    Czce,
    Dce,
    Ine,
    // China equities
    Sse,
    Szse,
    Bse,
    // International
    Cme,
    Nyse,
    Nasdaq,
    Smart,
    Binance,
    Otc,
    Local,
}

impl Exchange {
    /// Code stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Cffex => "CFFEX",
            Exchange::Shfe => "SHFE",
            Exchange::Czce => "CZCE",
            Exchange::Dce => "DCE",
            Exchange::Ine => "INE",
            Exchange::Sse => "SSE",
            Exchange::Szse => "SZSE",
            Exchange::Bse => "BSE",
            Exchange::Cme => "CME",
            Exchange::Nyse => "NYSE",
            Exchange::Nasdaq => "NASDAQ",
            Exchange::Smart => "SMART",
            Exchange::Binance => "BINANCE",
            Exchange::Otc => "OTC",
            Exchange::Local => "LOCAL",
        }
    }

    /// Parse a database code back into an exchange.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CFFEX" => Some(Exchange::Cffex),
            "SHFE" => Some(Exchange::Shfe),
            "CZCE" => Some(Exchange::Czce),
            "DCE" => Some(Exchange::Dce),
            "INE" => Some(Exchange::Ine),
            "SSE" => Some(Exchange::Sse),
            "SZSE" => Some(Exchange::Szse),
            "BSE" => Some(Exchange::Bse),
            "CME" => Some(Exchange::Cme),
            "NYSE" => Some(Exchange::Nyse),
            "NASDAQ" => Some(Exchange::Nasdaq),
            "SMART" => Some(Exchange::Smart),
            "BINANCE" => Some(Exchange::Binance),
            "OTC" => Some(Exchange::Otc),
            "LOCAL" => Some(Exchange::Local),
            _ => None,
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Minute,
    Hour,
    Daily,
    Weekly,
}

impl Interval {
    /// Code stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute => "1m",
            Interval::Hour => "1h",
            Interval::Daily => "d",
            Interval::Weekly => "w",
        }
    }

    /// Parse a database code back into an interval.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Interval::Minute),
            "1h" => Some(Interval::Hour),
            "d" => Some(Interval::Daily),
            "w" => Some(Interval::Weekly),
            _ => None,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one logical time series.
///
/// Bar series carry an interval; tick series do not. Two keys are the same
/// series exactly when all three components are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub exchange: Exchange,
    pub interval: Option<Interval>,
}

impl SeriesKey {
    pub fn bar(symbol: impl Into<String>, exchange: Exchange, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            exchange,
            interval: Some(interval),
        }
    }

    pub fn tick(symbol: impl Into<String>, exchange: Exchange) -> Self {
        Self {
            symbol: symbol.into(),
            exchange,
            interval: None,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.interval {
            Some(interval) => write!(f, "{}.{}/{}", self.symbol, self.exchange, interval),
            None => write!(f, "{}.{}", self.symbol, self.exchange),
        }
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarData {
    pub symbol: String,
    pub exchange: Exchange,
    pub interval: Interval,
    pub datetime: DateTime<Utc>,

    pub volume: Decimal,
    pub turnover: Decimal,
    pub open_interest: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,
}

impl BarData {
    /// The series this bar belongs to.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::bar(self.symbol.clone(), self.exchange, self.interval)
    }
}

/// One market tick snapshot with up to five levels of depth.
///
/// Levels 2-5 are optional since many feeds publish top-of-book only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickData {
    pub symbol: String,
    pub exchange: Exchange,
    pub datetime: DateTime<Utc>,

    pub name: String,
    pub volume: Decimal,
    pub turnover: Decimal,
    pub open_interest: Decimal,
    pub last_price: Decimal,
    pub last_volume: Decimal,
    pub limit_up: Decimal,
    pub limit_down: Decimal,

    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub pre_close: Decimal,

    pub bid_price_1: Decimal,
    pub bid_price_2: Option<Decimal>,
    pub bid_price_3: Option<Decimal>,
    pub bid_price_4: Option<Decimal>,
    pub bid_price_5: Option<Decimal>,

    pub ask_price_1: Decimal,
    pub ask_price_2: Option<Decimal>,
    pub ask_price_3: Option<Decimal>,
    pub ask_price_4: Option<Decimal>,
    pub ask_price_5: Option<Decimal>,

    pub bid_volume_1: Decimal,
    pub bid_volume_2: Option<Decimal>,
    pub bid_volume_3: Option<Decimal>,
    pub bid_volume_4: Option<Decimal>,
    pub bid_volume_5: Option<Decimal>,

    pub ask_volume_1: Decimal,
    pub ask_volume_2: Option<Decimal>,
    pub ask_volume_3: Option<Decimal>,
    pub ask_volume_4: Option<Decimal>,
    pub ask_volume_5: Option<Decimal>,

    /// Local receive time, if the feed provides one.
    pub localtime: Option<DateTime<Utc>>,
}

impl TickData {
    /// The series this tick belongs to.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::tick(self.symbol.clone(), self.exchange)
    }
}

/// Summary of one bar series: how many bars, earliest and latest timestamp.
///
/// Maintained by the store on every write; never written by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarOverview {
    pub symbol: String,
    pub exchange: Exchange,
    pub interval: Interval,
    pub count: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Summary of one tick series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOverview {
    pub symbol: String,
    pub exchange: Exchange,
    pub count: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_codes_round_trip() {
        for exchange in [
            Exchange::Cffex,
            Exchange::Shfe,
            Exchange::Sse,
            Exchange::Cme,
            Exchange::Binance,
            Exchange::Local,
        ] {
            assert_eq!(Exchange::from_str(exchange.as_str()), Some(exchange));
        }
        assert_eq!(Exchange::from_str("NOPE"), None);
    }

    #[test]
    fn test_interval_codes() {
        assert_eq!(Interval::Minute.as_str(), "1m");
        assert_eq!(Interval::from_str("d"), Some(Interval::Daily));
        assert_eq!(Interval::from_str("5m"), None);
    }

    #[test]
    fn test_series_key_display() {
        let bar_key = SeriesKey::bar("rb2410", Exchange::Shfe, Interval::Minute);
        assert_eq!(bar_key.to_string(), "rb2410.SHFE/1m");

        let tick_key = SeriesKey::tick("rb2410", Exchange::Shfe);
        assert_eq!(tick_key.to_string(), "rb2410.SHFE");
    }

    #[test]
    fn test_series_key_equality_is_structural() {
        let a = SeriesKey::bar("ES", Exchange::Cme, Interval::Hour);
        let b = SeriesKey::bar("ES", Exchange::Cme, Interval::Hour);
        let c = SeriesKey::tick("ES", Exchange::Cme);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
