//! Store-level integration tests against a real temp-file SQLite.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use tempfile::TempDir;

use quotehub_core::models::{
    AdjustmentType, DailyQuote, Instrument, InstrumentStatus, TradingCalendarEntry,
};
use quotehub_core::store::{
    CalendarStore, InstrumentFilter, InstrumentSort, InstrumentStore, MaintenanceStore, Page,
    QuoteFilter, QuoteStore,
};
use quotehub_core::{Exchange, InstrumentId};
use quotehub_storage_sqlite::calendar::CalendarRepository;
use quotehub_storage_sqlite::db::{init, spawn_writer};
use quotehub_storage_sqlite::instruments::InstrumentRepository;
use quotehub_storage_sqlite::maintenance::MaintenanceRepository;
use quotehub_storage_sqlite::quotes::QuoteRepository;

struct Fixture {
    _dir: TempDir,
    instruments: Arc<InstrumentRepository>,
    quotes: Arc<QuoteRepository>,
    calendar: Arc<CalendarRepository>,
    maintenance: Arc<MaintenanceRepository>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("quotes.db");
    let db_path_str = db_path.to_str().unwrap().to_string();
    let pool = init(&db_path_str).unwrap();
    let writer = spawn_writer(pool.clone());

    Fixture {
        _dir: dir,
        instruments: Arc::new(InstrumentRepository::new(pool.clone(), writer.clone())),
        quotes: Arc::new(QuoteRepository::new(pool.clone(), writer.clone())),
        calendar: Arc::new(CalendarRepository::new(pool.clone(), writer.clone())),
        maintenance: Arc::new(MaintenanceRepository::new(pool, db_path_str)),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn iid() -> InstrumentId {
    InstrumentId::new("600000", Exchange::Sse).unwrap()
}

fn instrument() -> Instrument {
    let now = Utc::now();
    Instrument {
        instrument_id: iid(),
        symbol: "600000".to_string(),
        name: "浦发银行".to_string(),
        exchange: Exchange::Sse,
        kind: "STOCK".to_string(),
        currency: "CNY".to_string(),
        listed_date: NaiveDate::from_ymd_opt(1999, 11, 10),
        delisted_date: None,
        issue_date: None,
        industry: Some("银行".to_string()),
        sector: None,
        market: Some("主板".to_string()),
        status: InstrumentStatus::Active,
        is_active: true,
        is_st: false,
        trading_status: 1,
        source: Some("TUSHARE".to_string()),
        source_symbol: Some("600000.SH".to_string()),
        created_at: now,
        updated_at: now,
        data_version: 1,
    }
}

fn quote(d: u32, close: rust_decimal::Decimal) -> DailyQuote {
    let now = Utc::now();
    DailyQuote {
        day: day(d),
        instrument_id: iid(),
        open: dec!(10.0),
        high: dec!(11.0),
        low: dec!(9.5),
        close,
        pre_close: Some(dec!(10.8)),
        change: Some(dec!(0)),
        pct_change: Some(dec!(0)),
        volume: 1_000_000,
        amount: dec!(10800000),
        turnover: None,
        tradestatus: 1,
        factor: dec!(1),
        adjustment_type: AdjustmentType::None,
        is_complete: true,
        quality_score: 1.0,
        source: Some("TUSHARE".to_string()),
        batch_id: Some("b1".to_string()),
        created_at: now,
        updated_at: now,
    }
}

fn calendar_entry(d: u32, open: bool) -> TradingCalendarEntry {
    let now = Utc::now();
    TradingCalendarEntry {
        exchange: Exchange::Sse,
        day: day(d),
        is_trading_day: open,
        reason: (!open).then(|| "weekend".to_string()),
        session_type: None,
        source: Some("TUSHARE".to_string()),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn upsert_quotes_is_idempotent_per_key() {
    let fx = fixture();
    fx.instruments
        .upsert_instruments(&[instrument()])
        .await
        .unwrap();

    let batch = vec![quote(2, dec!(10.8)), quote(3, dec!(10.9))];
    fx.quotes.upsert_quotes(&batch).await.unwrap();
    // Same keys again: no duplicates.
    fx.quotes.upsert_quotes(&batch).await.unwrap();

    let rows = fx
        .quotes
        .query(&QuoteFilter::range(iid(), day(1), day(5)))
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn upsert_quotes_last_writer_wins_and_preserves_created_at() {
    let fx = fixture();

    fx.quotes.upsert_quotes(&[quote(2, dec!(10.8))]).await.unwrap();
    let before = fx
        .quotes
        .query(&QuoteFilter::range(iid(), day(2), day(2)))
        .unwrap()
        .remove(0);

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    fx.quotes.upsert_quotes(&[quote(2, dec!(11.0))]).await.unwrap();

    let after = fx
        .quotes
        .query(&QuoteFilter::range(iid(), day(2), day(2)))
        .unwrap()
        .remove(0);

    assert_eq!(after.close, dec!(11.0));
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
async fn existing_dates_returns_stored_set() {
    let fx = fixture();
    fx.quotes
        .upsert_quotes(&[quote(2, dec!(10.8)), quote(5, dec!(10.9))])
        .await
        .unwrap();

    let dates = fx.quotes.existing_dates(&iid(), day(1), day(5)).unwrap();
    assert_eq!(dates.len(), 2);
    assert!(dates.contains(&day(2)));
    assert!(dates.contains(&day(5)));
    assert!(!dates.contains(&day(3)));
}

#[tokio::test]
async fn quote_filters_apply() {
    let fx = fixture();
    let mut suspended = quote(3, dec!(10.0));
    suspended.tradestatus = 0;
    let mut thin = quote(4, dec!(10.0));
    thin.volume = 10;
    thin.quality_score = 0.5;

    fx.quotes
        .upsert_quotes(&[quote(2, dec!(10.8)), suspended, thin])
        .await
        .unwrap();

    let mut filter = QuoteFilter::range(iid(), day(1), day(5));
    filter.include_suspended = false;
    assert_eq!(fx.quotes.query(&filter).unwrap().len(), 2);

    let mut filter = QuoteFilter::range(iid(), day(1), day(5));
    filter.min_volume = Some(1_000);
    assert_eq!(fx.quotes.query(&filter).unwrap().len(), 2);

    let mut filter = QuoteFilter::range(iid(), day(1), day(5));
    filter.min_quality_score = Some(0.9);
    assert_eq!(fx.quotes.query(&filter).unwrap().len(), 2);
}

#[tokio::test]
async fn instrument_upsert_bumps_version_keeps_created_at() {
    let fx = fixture();
    fx.instruments
        .upsert_instruments(&[instrument()])
        .await
        .unwrap();
    let before = fx.instruments.get_by_id(&iid()).unwrap().unwrap();

    let mut renamed = instrument();
    renamed.name = "浦发银行股份".to_string();
    fx.instruments.upsert_instruments(&[renamed]).await.unwrap();

    let after = fx.instruments.get_by_id(&iid()).unwrap().unwrap();
    assert_eq!(after.name, "浦发银行股份");
    assert_eq!(after.data_version, before.data_version + 1);
    assert_eq!(after.created_at, before.created_at);
}

#[tokio::test]
async fn instrument_lookup_accepts_native_spelling() {
    let fx = fixture();
    fx.instruments
        .upsert_instruments(&[instrument()])
        .await
        .unwrap();

    let native = InstrumentId::parse_native("600000.SH").unwrap();
    let found = fx.instruments.get_by_id(&native).unwrap();
    assert!(found.is_some());

    let by_symbol = fx.instruments.get_by_symbol("600000").unwrap();
    assert!(by_symbol.is_some());
}

#[tokio::test]
async fn instrument_listing_filters_and_pages() {
    let fx = fixture();
    let mut second = instrument();
    second.instrument_id = InstrumentId::new("600004", Exchange::Sse).unwrap();
    second.symbol = "600004".to_string();
    second.is_st = true;

    fx.instruments
        .upsert_instruments(&[instrument(), second])
        .await
        .unwrap();

    let all = fx
        .instruments
        .list(
            &InstrumentFilter::active_on(Exchange::Sse),
            InstrumentSort::Symbol,
            Page::all(),
        )
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].symbol, "600000");

    let st_only = fx
        .instruments
        .list(
            &InstrumentFilter {
                is_st: Some(true),
                ..InstrumentFilter::default()
            },
            InstrumentSort::Symbol,
            Page::all(),
        )
        .unwrap();
    assert_eq!(st_only.len(), 1);
    assert_eq!(st_only[0].symbol, "600004");

    let paged = fx
        .instruments
        .list(
            &InstrumentFilter::active_on(Exchange::Sse),
            InstrumentSort::Symbol,
            Page::new(1, 1),
        )
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].symbol, "600004");
}

#[tokio::test]
async fn count_with_quotes_counts_distinct_instruments() {
    let fx = fixture();
    fx.instruments
        .upsert_instruments(&[instrument()])
        .await
        .unwrap();
    assert_eq!(fx.instruments.count_with_quotes(Exchange::Sse).unwrap(), 0);

    fx.quotes
        .upsert_quotes(&[quote(2, dec!(10.8)), quote(3, dec!(10.9))])
        .await
        .unwrap();
    assert_eq!(fx.instruments.count_with_quotes(Exchange::Sse).unwrap(), 1);
}

#[tokio::test]
async fn calendar_upsert_is_unique_per_exchange_day() {
    let fx = fixture();
    fx.calendar
        .upsert_calendar(&[calendar_entry(2, true), calendar_entry(6, false)])
        .await
        .unwrap();
    // Rewriting the same day flips the flag without duplicating the row.
    fx.calendar
        .upsert_calendar(&[calendar_entry(2, false)])
        .await
        .unwrap();

    let entries = fx.calendar.entries(Exchange::Sse, day(1), day(7)).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].is_trading_day);

    let trading = fx
        .calendar
        .trading_days(Exchange::Sse, day(1), day(7), true)
        .unwrap();
    assert!(trading.is_empty());
}

#[tokio::test]
async fn retention_deletes_only_before_cutoff() {
    let fx = fixture();
    fx.quotes
        .upsert_quotes(&[quote(2, dec!(10.8)), quote(10, dec!(11.0))])
        .await
        .unwrap();

    let removed = fx.quotes.delete_before(day(5)).await.unwrap();
    assert_eq!(removed, 1);

    let rows = fx
        .quotes
        .query(&QuoteFilter::range(iid(), day(1), day(31)))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].day, day(10));
}

#[tokio::test]
async fn latest_quotes_respects_lookback() {
    let fx = fixture();
    // Day numbers here are relative to today because the lookback is.
    let today = quotehub_core::time::session_today();
    let mut recent = quote(2, dec!(10.8));
    recent.day = today - chrono::Duration::days(2);
    let mut stale = quote(3, dec!(9.9));
    stale.day = today - chrono::Duration::days(30);

    fx.quotes.upsert_quotes(&[recent, stale]).await.unwrap();

    let latest = fx.quotes.latest_quotes(&[iid()], 5).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].day, today - chrono::Duration::days(2));

    // A wide enough lookback still returns only the newest row per id.
    let latest = fx.quotes.latest_quotes(&[iid()], 60).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].day, today - chrono::Duration::days(2));
}

#[tokio::test]
async fn snapshot_stats_aggregates() {
    let fx = fixture();
    fx.instruments
        .upsert_instruments(&[instrument()])
        .await
        .unwrap();
    let mut low_quality = quote(3, dec!(10.0));
    low_quality.quality_score = 0.4;
    fx.quotes
        .upsert_quotes(&[quote(2, dec!(10.8)), low_quality])
        .await
        .unwrap();
    fx.calendar
        .upsert_calendar(&[calendar_entry(2, true)])
        .await
        .unwrap();

    let stats = fx.maintenance.snapshot_stats().unwrap();
    assert_eq!(stats.total_instruments, 1);
    assert_eq!(stats.total_quotes, 2);
    assert_eq!(stats.calendar_entries, 1);
    assert_eq!(stats.instruments_by_exchange.get("SSE"), Some(&1));
    assert_eq!(stats.earliest_quote_day, Some(day(2)));
    assert_eq!(stats.latest_quote_day, Some(day(3)));
    assert_eq!(stats.quotes_below_threshold, 1);
}

#[tokio::test]
async fn integrity_check_is_clean_on_fresh_db() {
    let fx = fixture();
    assert!(fx.maintenance.integrity_check().unwrap().is_empty());
}
