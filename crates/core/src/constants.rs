//! Platform-wide tuning constants.

use std::time::Duration;

/// Earliest date any A-share history can start (SSE opening).
pub const DEFAULT_HISTORY_START: (i32, u32, u32) = (1990, 12, 19);

/// Instruments committed together in one store transaction.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Concurrent instrument fetches per exchange.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Hard ceiling on concurrent fetchers.
pub const MAX_CONCURRENT_LIMIT: usize = 10;

/// Pause between chunk fetches of one instrument, on top of the rate
/// limiter's own pacing.
pub const INTER_CHUNK_DELAY: Duration = Duration::from_millis(500);

/// Pause between committed batches.
pub const INTER_BATCH_DELAY: Duration = Duration::from_secs(2);

/// Pause between individual gap repairs.
pub const GAP_FILL_DELAY: Duration = Duration::from_secs(1);

/// Deadline for fetching one instrument's whole window.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Error strings retained in the progress ring.
pub const MAX_PROGRESS_ERRORS: usize = 50;

/// Mean batch quality below this counts the batch's rows as quality issues.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;

/// Instrument-list cache is honored only at or above this row count.
pub const INSTRUMENT_CACHE_MIN_ROWS: i64 = 100;

/// Instrument-list cache expires after this many hours.
pub const INSTRUMENT_CACHE_MAX_AGE_HOURS: i64 = 24;

/// Default lookback for latest-quote queries.
pub const DEFAULT_LATEST_LOOKBACK_DAYS: i64 = 5;

/// How far next/previous trading-day scans look before giving up.
pub const TRADING_DAY_SCAN_LIMIT: i64 = 30;
