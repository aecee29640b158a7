//! Storage traits implemented by the SQLite layer.
//!
//! The core is storage-agnostic: services receive these traits at
//! construction and never see a connection. Reads are synchronous (they go
//! straight to the pool); mutations are async because the storage layer
//! serializes them through a single writer.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use quotehub_market_data::{Exchange, InstrumentId};

use crate::errors::Result;
use crate::models::{
    DailyQuote, DataUpdateRecord, Instrument, InstrumentStatus, TradingCalendarEntry,
};

// =============================================================================
// Query parameter types
// =============================================================================

/// Pagination window. `Page::all()` disables the limit for internal
/// full-scans (the pipeline walking an exchange).
#[derive(Clone, Copy, Debug)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    pub fn all() -> Self {
        Self {
            limit: None,
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(100, 0)
    }
}

/// Sort order for instrument listings.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentSort {
    #[default]
    Symbol,
    Name,
    ListedDate,
    UpdatedAt,
}

/// Filters for instrument listings. All fields conjunctive.
#[derive(Clone, Debug, Default)]
pub struct InstrumentFilter {
    pub exchange: Option<Exchange>,
    pub kind: Option<String>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,
    pub status: Option<InstrumentStatus>,
    pub is_active: Option<bool>,
    pub is_st: Option<bool>,
    pub listed_after: Option<NaiveDate>,
    pub listed_before: Option<NaiveDate>,
}

impl InstrumentFilter {
    /// Active instruments of one exchange — the pipeline's working set.
    pub fn active_on(exchange: Exchange) -> Self {
        Self {
            exchange: Some(exchange),
            is_active: Some(true),
            ..Self::default()
        }
    }
}

/// Filters for quote queries.
#[derive(Clone, Debug, Default)]
pub struct QuoteFilter {
    pub instrument_id: Option<InstrumentId>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub tradestatus: Option<i32>,
    pub min_volume: Option<i64>,
    pub min_quality_score: Option<f64>,
    /// When false, rows with `tradestatus = 0` are dropped.
    pub include_suspended: bool,
    pub page: Option<Page>,
}

impl QuoteFilter {
    pub fn range(instrument_id: InstrumentId, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            instrument_id: Some(instrument_id),
            start: Some(start),
            end: Some(end),
            include_suspended: true,
            ..Self::default()
        }
    }
}

/// Aggregate store statistics for the stats endpoint and reports.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_instruments: i64,
    pub total_quotes: i64,
    pub calendar_entries: i64,
    pub instruments_by_exchange: BTreeMap<String, i64>,
    pub instruments_by_type: BTreeMap<String, i64>,
    pub instruments_by_status: BTreeMap<String, i64>,
    pub earliest_quote_day: Option<NaiveDate>,
    pub latest_quote_day: Option<NaiveDate>,
    pub average_quality_score: Option<f64>,
    pub quotes_below_threshold: i64,
}

// =============================================================================
// Store traits
// =============================================================================

/// Instrument master storage.
#[async_trait]
pub trait InstrumentStore: Send + Sync {
    /// Insert-or-update by `instrument_id`. Existing rows keep their
    /// `created_at`, get a bumped `updated_at` and an incremented
    /// `data_version`. Returns the number of rows written.
    async fn upsert_instruments(&self, instruments: &[Instrument]) -> Result<usize>;

    fn list(
        &self,
        filter: &InstrumentFilter,
        sort: InstrumentSort,
        page: Page,
    ) -> Result<Vec<Instrument>>;

    /// Lookup by canonical id, falling back to the legacy native spelling.
    fn get_by_id(&self, instrument_id: &InstrumentId) -> Result<Option<Instrument>>;

    fn get_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>>;

    fn count_by_exchange(&self, exchange: Exchange) -> Result<i64>;

    /// Most recent `updated_at` across an exchange's instruments — the
    /// freshness input to the listing cache rule.
    fn latest_update(&self, exchange: Exchange) -> Result<Option<DateTime<Utc>>>;

    /// Distinct active instruments of the exchange that have at least one
    /// stored quote — the resume heuristic's input.
    fn count_with_quotes(&self, exchange: Exchange) -> Result<i64>;
}

/// Daily quote storage.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Row-wise idempotent upsert keyed on `(day, instrument_id)`. All
    /// rows of one call become visible atomically. Existing rows keep
    /// `created_at`; `updated_at` always advances. Returns rows written.
    async fn upsert_quotes(&self, quotes: &[DailyQuote]) -> Result<usize>;

    /// The set of days in `[start, end]` that already have a stored row.
    fn existing_dates(
        &self,
        instrument_id: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>>;

    fn query(&self, filter: &QuoteFilter) -> Result<Vec<DailyQuote>>;

    fn latest_day(&self, instrument_id: &InstrumentId) -> Result<Option<NaiveDate>>;

    /// For each id, the newest stored row within the last `lookback_days`.
    fn latest_quotes(
        &self,
        instrument_ids: &[InstrumentId],
        lookback_days: i64,
    ) -> Result<Vec<DailyQuote>>;

    /// Explicit retention trim; nothing else ever deletes quote rows.
    async fn delete_before(&self, cutoff: NaiveDate) -> Result<usize>;
}

/// Trading calendar storage.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Upsert per `(exchange, date)`; at most one row per pair survives.
    async fn upsert_calendar(&self, entries: &[TradingCalendarEntry]) -> Result<usize>;

    /// Days in `[start, end]`, sorted ascending. With `only_trading`, just
    /// the days the market is open; otherwise every known calendar row.
    fn trading_days(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
        only_trading: bool,
    ) -> Result<Vec<NaiveDate>>;

    fn entries(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradingCalendarEntry>>;
}

/// Audit trail of orchestrator runs.
#[async_trait]
pub trait UpdateRecordStore: Send + Sync {
    async fn create(&self, record: &DataUpdateRecord) -> Result<()>;
    async fn update(&self, record: &DataUpdateRecord) -> Result<()>;
    fn recent(&self, limit: i64) -> Result<Vec<DataUpdateRecord>>;
}

/// Maintenance surface: statistics, vacuum/analyze, backups.
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    fn snapshot_stats(&self) -> Result<StoreStats>;

    /// Reclaim space. Runs only from the scheduler, never concurrently
    /// with writes.
    async fn vacuum(&self) -> Result<()>;

    async fn analyze(&self) -> Result<()>;

    /// Copy the store file into `dir`, optionally compressed. Returns the
    /// backup path.
    async fn backup(&self, dir: &Path, compress: bool) -> Result<PathBuf>;

    /// Integrity findings; empty means healthy.
    fn integrity_check(&self) -> Result<Vec<String>>;
}
