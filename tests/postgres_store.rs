//! End-to-end store tests against a live PostgreSQL.
//!
//! These tests need a database and are ignored by default. Run with:
//!
//! ```text
//! DATABASE_URL=postgresql://localhost/market_store_test \
//!     cargo test -- --ignored --test-threads=1
//! ```
//!
//! Each test uses its own symbols; the reconciliation test truncates the
//! bar tables, hence the single-threaded run.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;

use market_store::{
    run_migrations, BarData, Exchange, Interval, MarketStore, SeriesKey, StoreError, SymbolInfo,
    TickData,
};

async fn test_store() -> MarketStore {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/market_store_test".into());
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    run_migrations(&pool).await.expect("run migrations");
    MarketStore::new(pool, chrono_tz::UTC, 500)
}

fn ts(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, hour, min, 0).unwrap()
}

fn bar(symbol: &str, datetime: DateTime<Utc>, close: Decimal) -> BarData {
    BarData {
        symbol: symbol.to_string(),
        exchange: Exchange::Shfe,
        interval: Interval::Minute,
        datetime,
        volume: dec!(100),
        turnover: dec!(500000),
        open_interest: dec!(1000),
        open_price: close - dec!(1),
        high_price: close + dec!(1),
        low_price: close - dec!(2),
        close_price: close,
    }
}

fn tick(symbol: &str, datetime: DateTime<Utc>, last: Decimal) -> TickData {
    TickData {
        symbol: symbol.to_string(),
        exchange: Exchange::Shfe,
        datetime,
        name: symbol.to_string(),
        volume: dec!(10),
        turnover: dec!(50000),
        open_interest: dec!(1000),
        last_price: last,
        last_volume: dec!(1),
        limit_up: last + dec!(100),
        limit_down: last - dec!(100),
        open_price: last,
        high_price: last,
        low_price: last,
        pre_close: last,
        bid_price_1: last - dec!(1),
        bid_price_2: None,
        bid_price_3: None,
        bid_price_4: None,
        bid_price_5: None,
        ask_price_1: last + dec!(1),
        ask_price_2: None,
        ask_price_3: None,
        ask_price_4: None,
        ask_price_5: None,
        bid_volume_1: dec!(5),
        bid_volume_2: None,
        bid_volume_3: None,
        bid_volume_4: None,
        bid_volume_5: None,
        ask_volume_1: dec!(5),
        ask_volume_2: None,
        ask_volume_3: None,
        ask_volume_4: None,
        ask_volume_5: None,
        localtime: None,
    }
}

async fn bar_overview_for(store: &MarketStore, symbol: &str) -> Option<market_store::BarOverview> {
    store
        .bar_overviews()
        .await
        .unwrap()
        .into_iter()
        .find(|o| o.symbol == symbol)
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn empty_batch_is_rejected_before_store_access() {
    let store = test_store().await;
    let err = store.save_bars(&[], false).await.unwrap_err();
    assert!(matches!(err, StoreError::EmptyBatch));
    assert!(!err.is_retryable());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn idempotent_replace_keeps_second_payload() {
    let store = test_store().await;
    let symbol = "IDEM01";
    store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();

    store
        .save_bars(&[bar(symbol, ts(9, 0), dec!(100))], false)
        .await
        .unwrap();
    store
        .save_bars(&[bar(symbol, ts(9, 0), dec!(200))], false)
        .await
        .unwrap();

    let bars = store
        .load_bars(symbol, Exchange::Shfe, Interval::Minute, ts(8, 0), ts(10, 0))
        .await
        .unwrap();
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].close_price, dec!(200));

    let overview = bar_overview_for(&store, symbol).await.unwrap();
    assert_eq!(overview.count, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn overview_tracks_overlapping_backfills() {
    let store = test_store().await;
    let symbol = "BACK01";
    store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();

    let first: Vec<BarData> = (0..5).map(|i| bar(symbol, ts(9, i), dec!(100))).collect();
    store.save_bars(&first, false).await.unwrap();

    // Overlaps minutes 3-4, adds 5-7.
    let second: Vec<BarData> = (3..8).map(|i| bar(symbol, ts(9, i), dec!(101))).collect();
    store.save_bars(&second, false).await.unwrap();

    let overview = bar_overview_for(&store, symbol).await.unwrap();
    assert_eq!(overview.count, 8);
    assert_eq!(overview.start, ts(9, 0));
    assert_eq!(overview.end, ts(9, 7));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn streaming_append_updates_count_without_recount() {
    let store = test_store().await;
    let symbol = "STRM01";
    store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();

    let seed: Vec<BarData> = (0..100).map(|i| bar(symbol, ts(9, i % 60), dec!(100))).collect();
    store.save_bars(&seed, false).await.unwrap();
    let before = bar_overview_for(&store, symbol).await.unwrap();
    assert_eq!(before.count, 60); // 100 raw rows collapse onto 60 minutes

    let fresh: Vec<BarData> = (0..10).map(|i| bar(symbol, ts(10, i), dec!(105))).collect();
    store.save_bars(&fresh, true).await.unwrap();

    let after = bar_overview_for(&store, symbol).await.unwrap();
    assert_eq!(after.count, before.count + 10);
    assert_eq!(after.start, before.start);
    assert_eq!(after.end, ts(10, 9));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn colliding_timestamps_in_one_batch_keep_last_write() {
    let store = test_store().await;
    let symbol = "DUP01";
    store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();

    // 100 bars over 60 distinct minutes; later rows rewrite earlier ones.
    let bars: Vec<BarData> = (0..100u32)
        .map(|i| bar(symbol, ts(9, i % 60), Decimal::from(i)))
        .collect();
    store.save_bars(&bars, false).await.unwrap();

    let overview = bar_overview_for(&store, symbol).await.unwrap();
    assert_eq!(overview.count, 60);

    let loaded = store
        .load_bars(symbol, Exchange::Shfe, Interval::Minute, ts(9, 0), ts(9, 59))
        .await
        .unwrap();
    assert_eq!(loaded.len(), 60);
    // Minute 0 was written by i = 0, then rewritten by i = 60.
    assert_eq!(loaded[0].close_price, Decimal::from(60u32));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn misdeclared_stream_hint_does_not_corrupt_count() {
    let store = test_store().await;
    let symbol = "STRM02";
    store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();

    let seed: Vec<BarData> = (0..5).map(|i| bar(symbol, ts(9, i), dec!(100))).collect();
    store.save_bars(&seed, false).await.unwrap();

    // Claims streaming but rewrites the same five minutes.
    store.save_bars(&seed, true).await.unwrap();

    let overview = bar_overview_for(&store, symbol).await.unwrap();
    assert_eq!(overview.count, 5);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn listing_reconciles_missing_overviews() {
    let store = test_store().await;

    // Simulate a store populated before overview governance.
    sqlx::query("TRUNCATE bar_data, bar_overview")
        .execute(store.pool())
        .await
        .unwrap();
    for (symbol, count) in [("RAW01", 3), ("RAW02", 4), ("RAW03", 5)] {
        let bars: Vec<BarData> = (0..count).map(|i| bar(symbol, ts(9, i), dec!(100))).collect();
        store.save_bars(&bars, false).await.unwrap();
    }
    sqlx::query("TRUNCATE bar_overview")
        .execute(store.pool())
        .await
        .unwrap();

    let overviews = store.bar_overviews().await.unwrap();
    assert_eq!(overviews.len(), 3);

    for (symbol, count) in [("RAW01", 3i64), ("RAW02", 4), ("RAW03", 5)] {
        let o = overviews.iter().find(|o| o.symbol == symbol).unwrap();
        assert_eq!(o.count, count);
        assert_eq!(o.start, ts(9, 0));
        assert_eq!(o.end, ts(9, count as u32 - 1));
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn rebuild_with_filter_targets_one_series() {
    let store = test_store().await;
    for symbol in ["RBF01", "RBF02"] {
        store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();
        let bars: Vec<BarData> = (0..3).map(|i| bar(symbol, ts(9, i), dec!(100))).collect();
        store.save_bars(&bars, false).await.unwrap();
    }

    // Corrupt both overview rows, then rebuild only the first series.
    sqlx::query("UPDATE bar_overview SET count = 999 WHERE symbol IN ('RBF01', 'RBF02')")
        .execute(store.pool())
        .await
        .unwrap();

    let key = SeriesKey::bar("RBF01", Exchange::Shfe, Interval::Minute);
    store.rebuild_bar_overviews(Some(&key)).await.unwrap();

    assert_eq!(bar_overview_for(&store, "RBF01").await.unwrap().count, 3);
    assert_eq!(bar_overview_for(&store, "RBF02").await.unwrap().count, 999);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn bar_rebuild_rejects_a_filter_without_interval() {
    let store = test_store().await;
    let key = SeriesKey::tick("RBF03", Exchange::Shfe);
    let err = store.rebuild_bar_overviews(Some(&key)).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn deleting_a_series_cascades_to_its_overview() {
    let store = test_store().await;
    let symbol = "DEL01";
    store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();

    let bars: Vec<BarData> = (0..4).map(|i| bar(symbol, ts(9, i), dec!(100))).collect();
    store.save_bars(&bars, false).await.unwrap();

    let deleted = store
        .delete_bars(symbol, Exchange::Shfe, Interval::Minute)
        .await
        .unwrap();
    assert_eq!(deleted, 4);
    assert!(bar_overview_for(&store, symbol).await.is_none());

    // Deleting a series that does not exist is a clean no-op.
    let deleted = store
        .delete_bars("DOES_NOT_EXIST", Exchange::Shfe, Interval::Minute)
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn range_bounds_are_inclusive_and_ascending() {
    let store = test_store().await;
    let symbol = "RNG01";
    store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();

    // T1..T4, saved out of order.
    let bars = vec![
        bar(symbol, ts(9, 3), dec!(103)),
        bar(symbol, ts(9, 0), dec!(100)),
        bar(symbol, ts(9, 2), dec!(102)),
        bar(symbol, ts(9, 1), dec!(101)),
    ];
    store.save_bars(&bars, false).await.unwrap();

    let loaded = store
        .load_bars(symbol, Exchange::Shfe, Interval::Minute, ts(9, 0), ts(9, 2))
        .await
        .unwrap();
    let times: Vec<_> = loaded.iter().map(|b| b.datetime).collect();
    assert_eq!(times, vec![ts(9, 0), ts(9, 1), ts(9, 2)]);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn concurrent_disjoint_backfills_lose_no_update() {
    let store = test_store().await;
    let symbol = "CONC01";
    store.delete_bars(symbol, Exchange::Shfe, Interval::Minute).await.unwrap();

    let early: Vec<BarData> = (0..20).map(|i| bar(symbol, ts(9, i), dec!(100))).collect();
    let late: Vec<BarData> = (0..20).map(|i| bar(symbol, ts(11, i), dec!(110))).collect();

    let (a, b) = tokio::join!(
        store.save_bars(&early, false),
        store.save_bars(&late, false)
    );
    a.unwrap();
    b.unwrap();

    let overview = bar_overview_for(&store, symbol).await.unwrap();
    assert_eq!(overview.count, 40);
    assert_eq!(overview.start, ts(9, 0));
    assert_eq!(overview.end, ts(11, 19));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn tick_series_round_trip_and_overview() {
    let store = test_store().await;
    let symbol = "TICK01";
    store.delete_ticks(symbol, Exchange::Shfe).await.unwrap();

    let mut ticks: Vec<TickData> = (0..6).map(|i| tick(symbol, ts(9, i), dec!(4000))).collect();
    ticks[0].localtime = Some(ts(9, 0));
    store.save_ticks(&ticks, false).await.unwrap();

    let loaded = store
        .load_ticks(symbol, Exchange::Shfe, ts(9, 0), ts(9, 5))
        .await
        .unwrap();
    assert_eq!(loaded.len(), 6);
    assert_eq!(loaded[0].last_price, dec!(4000));
    assert_eq!(loaded[0].bid_price_2, None);
    assert_eq!(loaded[0].localtime, Some(ts(9, 0)));
    assert_eq!(loaded[1].localtime, None);

    let overview = store
        .tick_overviews()
        .await
        .unwrap()
        .into_iter()
        .find(|o| o.symbol == symbol)
        .unwrap();
    assert_eq!(overview.count, 6);
    assert_eq!(overview.start, ts(9, 0));
    assert_eq!(overview.end, ts(9, 5));

    store.delete_ticks(symbol, Exchange::Shfe).await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn symbol_info_upsert_lookup_delete() {
    let store = test_store().await;

    let info = SymbolInfo {
        symbol: "SYMINFO01".to_string(),
        exchange: Exchange::Shfe,
        sec_id: "rb2410".to_string(),
        sec_name: Some("Rebar 2410".to_string()),
        security_type: Some("FUT".to_string()),
        price_tick: Some(dec!(1)),
        listed_date: Some(ts(0, 0)),
        delisted_date: None,
        underlying_symbol: None,
        option_type: None,
    };
    store.save_symbol_infos(std::slice::from_ref(&info)).await.unwrap();

    // Upsert replaces in place.
    let renamed = SymbolInfo {
        sec_name: Some("Rebar Oct 2024".to_string()),
        ..info.clone()
    };
    store.save_symbol_infos(std::slice::from_ref(&renamed)).await.unwrap();

    let loaded = store
        .load_symbol_infos(Some("SYMINFO01"), Some(Exchange::Shfe))
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].sec_name.as_deref(), Some("Rebar Oct 2024"));

    // Unfiltered delete is refused.
    assert_eq!(store.delete_symbol_infos(None, None).await.unwrap(), 0);

    let deleted = store
        .delete_symbol_infos(Some("SYMINFO01"), Some(Exchange::Shfe))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
}
