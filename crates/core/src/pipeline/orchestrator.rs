//! The batch download engine.
//!
//! Executes a download specification to durable completion: enumerates
//! instruments, optionally refreshes calendars, walks each exchange in
//! batches, fans fetches out across a bounded worker pool, commits one
//! store upsert per batch, and journals progress after every batch so an
//! interrupted run can resume.
//!
//! Counters are updated only by the run that owns the batch; readers (the
//! progress endpoint) see eventually-consistent snapshots.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use serde_json::json;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use quotehub_market_data::Exchange;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_FETCH_TIMEOUT, DEFAULT_HISTORY_START, DEFAULT_MAX_CONCURRENT,
    DEFAULT_QUALITY_THRESHOLD, INTER_BATCH_DELAY, INTER_CHUNK_DELAY, MAX_CONCURRENT_LIMIT,
};
use crate::errors::{Error, Result};
use crate::gaps::GapEngine;
use crate::market_data::MarketDataService;
use crate::models::{DailyQuote, DataUpdateRecord, DataUpdateStatus, Instrument, UpdateKind};
use crate::quality::QualityStage;
use crate::reports::ReportWriter;
use crate::store::{InstrumentStore, MaintenanceStore, QuoteStore, UpdateRecordStore};
use crate::time::{session_today, session_yesterday};

use super::journal::ProgressJournal;
use super::planner::DownloadPlanner;
use super::progress::DownloadProgress;

/// Tuning for the pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Instruments committed per store transaction.
    pub batch_size: usize,
    /// Days per provider call; 0 fetches an instrument's window whole.
    pub chunk_days: i64,
    /// Concurrent instrument fetches per exchange (clamped to 1..=10).
    pub max_concurrent: usize,
    /// Deadline for one instrument's whole fetch.
    pub fetch_timeout: std::time::Duration,
    pub inter_chunk_delay: std::time::Duration,
    pub inter_batch_delay: std::time::Duration,
    pub quality_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_days: 0,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            inter_chunk_delay: INTER_CHUNK_DELAY,
            inter_batch_delay: INTER_BATCH_DELAY,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }
}

/// What to download.
#[derive(Clone, Debug)]
pub struct DownloadSpec {
    pub exchanges: Vec<Exchange>,
    /// None: from each instrument's listed date.
    pub start: Option<NaiveDate>,
    /// None: through yesterday (session zone).
    pub end: Option<NaiveDate>,
    /// None: the configured default.
    pub quality_threshold: Option<f64>,
    pub resume: bool,
    /// None: refresh for full-history runs, trust the stored calendar for
    /// resumes and explicit sub-windows.
    pub force_update_calendar: Option<bool>,
}

impl DownloadSpec {
    pub fn full_history(exchanges: Vec<Exchange>) -> Self {
        Self {
            exchanges,
            start: None,
            end: None,
            quality_threshold: None,
            resume: true,
            force_update_calendar: None,
        }
    }
}

/// Final accounting of one run.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub batch_id: String,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_quotes: usize,
    pub quality_issues: usize,
    pub gaps_detected: usize,
    pub cancelled: bool,
}

/// Per-instrument result inside one batch.
struct InstrumentOutcome {
    quotes: Vec<DailyQuote>,
    rejected: usize,
    error: Option<String>,
}

impl InstrumentOutcome {
    fn failed(error: String) -> Self {
        Self {
            quotes: Vec::new(),
            rejected: 0,
            error: Some(error),
        }
    }
}

struct RunContext {
    batch_id: String,
    start: Option<NaiveDate>,
    end: NaiveDate,
    prune_stored: bool,
    token: CancellationToken,
}

/// The batch download engine.
pub struct PipelineOrchestrator {
    market_data: Arc<MarketDataService>,
    planner: DownloadPlanner,
    quality: QualityStage,
    instruments: Arc<dyn InstrumentStore>,
    quotes: Arc<dyn QuoteStore>,
    updates: Arc<dyn UpdateRecordStore>,
    maintenance: Arc<dyn MaintenanceStore>,
    gap_engine: Arc<GapEngine>,
    journal: ProgressJournal,
    reports: ReportWriter,
    config: PipelineConfig,

    progress: RwLock<DownloadProgress>,
    running: AtomicBool,
    cancel: StdMutex<CancellationToken>,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market_data: Arc<MarketDataService>,
        planner: DownloadPlanner,
        instruments: Arc<dyn InstrumentStore>,
        quotes: Arc<dyn QuoteStore>,
        updates: Arc<dyn UpdateRecordStore>,
        maintenance: Arc<dyn MaintenanceStore>,
        gap_engine: Arc<GapEngine>,
        journal: ProgressJournal,
        reports: ReportWriter,
        config: PipelineConfig,
    ) -> Self {
        Self {
            market_data,
            planner,
            quality: QualityStage::new(),
            instruments,
            quotes,
            updates,
            maintenance,
            gap_engine,
            journal,
            reports,
            config,
            progress: RwLock::new(DownloadProgress::new()),
            running: AtomicBool::new(false),
            cancel: StdMutex::new(CancellationToken::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Eventually-consistent snapshot for the progress endpoint.
    pub fn progress_snapshot(&self) -> DownloadProgress {
        self.progress.read().expect("progress lock").clone()
    }

    /// Request cancellation; observed at the next suspension point.
    pub fn cancel(&self) {
        self.cancel.lock().expect("cancel lock").cancel();
    }

    /// Execute a download run to completion (or cancellation).
    pub async fn run(&self, spec: DownloadSpec) -> Result<DownloadOutcome> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidInput("download already in progress".into()));
        }
        let result = self.run_inner(&spec).await;
        self.running.store(false, Ordering::SeqCst);

        // The journal is flushed on every exit path, including errors.
        let snapshot = self.progress_snapshot();
        if let Err(e) = self.journal.save(&snapshot).await {
            error!("Final journal flush failed: {}", e);
        }
        result
    }

    async fn run_inner(&self, spec: &DownloadSpec) -> Result<DownloadOutcome> {
        let token = {
            let mut guard = self.cancel.lock().expect("cancel lock");
            *guard = CancellationToken::new();
            guard.clone()
        };

        // Resume check: continue from the journal only when asked to and
        // when the snapshot actually has progress in it.
        let journaled = if spec.resume {
            self.journal.load().await?.filter(|p| p.is_resumable())
        } else {
            None
        };
        let resuming = journaled.is_some();
        {
            let mut progress = self.progress.write().expect("progress lock");
            *progress = journaled.unwrap_or_default();
        }

        let end = spec.end.unwrap_or_else(session_yesterday);
        let threshold = spec
            .quality_threshold
            .unwrap_or(self.config.quality_threshold);
        let full_history = spec.start.is_none() && spec.end.is_none();
        let refresh_calendar = spec
            .force_update_calendar
            .unwrap_or(full_history && !resuming);
        let kind = if full_history {
            UpdateKind::Full
        } else {
            UpdateKind::Incremental
        };

        info!(
            "Starting download run (exchanges: {:?}, end: {}, resume: {})",
            spec.exchanges, end, resuming
        );

        // Instrument enumeration. The total across exchanges is fixed for
        // the whole run.
        let mut per_exchange: Vec<(Exchange, Vec<Instrument>)> = Vec::new();
        for &exchange in &spec.exchanges {
            let instruments = self.market_data.instrument_list(exchange, false).await?;
            per_exchange.push((exchange, instruments));
        }
        if !resuming {
            let total = per_exchange.iter().map(|(_, i)| i.len()).sum();
            self.with_progress(|p| p.total_instruments = total);
        }
        self.save_journal().await;

        // Calendar refresh. Errors are logged, never fatal.
        if refresh_calendar {
            let (y, m, d) = DEFAULT_HISTORY_START;
            let calendar_start = spec
                .start
                .unwrap_or_else(|| NaiveDate::from_ymd_opt(y, m, d).expect("valid epoch"));
            for &exchange in &spec.exchanges {
                if let Err(e) = self
                    .market_data
                    .update_trading_calendar(exchange, calendar_start, end)
                    .await
                {
                    warn!("Calendar refresh failed for {}: {}", exchange, e);
                }
            }
        } else {
            info!("Using stored trading calendar (no forced refresh)");
        }

        let batch_id = self.progress_snapshot().batch_id;
        let ctx = RunContext {
            batch_id: batch_id.clone(),
            start: spec.start,
            end,
            prune_stored: spec.resume,
            token: token.clone(),
        };

        let mut cancelled = false;
        'exchanges: for (exchange, instruments) in &per_exchange {
            if instruments.is_empty() {
                warn!("No instruments for {}", exchange);
                continue;
            }
            self.with_progress(|p| p.current_exchange = exchange.code().to_string());

            let run_start = ctx.start.unwrap_or_else(|| {
                let (y, m, d) = DEFAULT_HISTORY_START;
                NaiveDate::from_ymd_opt(y, m, d).expect("valid epoch")
            });
            let mut record = DataUpdateRecord::begin(
                &batch_id,
                kind,
                *exchange,
                run_start,
                end,
                instruments.len() as i64,
            );
            if let Err(e) = self.updates.create(&record).await {
                warn!("Audit record create failed for {}: {}", exchange, e);
            }

            let batch_size = self.config.batch_size.max(1);
            let batches: Vec<&[Instrument]> = instruments.chunks(batch_size).collect();
            self.with_progress(|p| p.total_batches = batches.len());

            // Resume heuristic: skip batches that are certainly complete.
            // Correctness never depends on this — every instrument that
            // does run is re-planned against stored dates.
            let start_batch = if resuming {
                let done = self.instruments.count_with_quotes(*exchange)?;
                (done as usize / batch_size) + 1
            } else {
                1
            };
            if start_batch > 1 {
                info!(
                    "Resume: skipping {} certainly-complete batches for {}",
                    start_batch - 1,
                    exchange
                );
            }

            let mut exchange_processed = 0i64;
            let mut exchange_quotes = 0i64;

            for (index, batch) in batches.iter().enumerate() {
                let batch_no = index + 1;
                if batch_no < start_batch {
                    continue;
                }
                if token.is_cancelled() {
                    cancelled = true;
                    break 'exchanges;
                }

                self.with_progress(|p| p.current_batch = batch_no);
                info!(
                    "Processing batch {}/{} for {}",
                    batch_no,
                    batches.len(),
                    exchange
                );

                let (processed_quotes, batch_failed) =
                    self.process_batch(batch, threshold, &ctx).await;
                exchange_processed += batch.len() as i64;
                exchange_quotes += processed_quotes as i64;

                record.record_progress(exchange_processed, exchange_quotes);
                if let Err(e) = self.updates.update(&record).await {
                    warn!("Audit record update failed: {}", e);
                }
                self.save_journal().await;

                if batch_failed {
                    warn!("Batch {}/{} for {} had failures", batch_no, batches.len(), exchange);
                }

                if batch_no < batches.len() {
                    tokio::select! {
                        _ = token.cancelled() => {
                            cancelled = true;
                            break 'exchanges;
                        }
                        _ = tokio::time::sleep(self.config.inter_batch_delay) => {}
                    }
                }
            }

            let status = if cancelled {
                DataUpdateStatus::Failed
            } else {
                DataUpdateStatus::Completed
            };
            record.finish(status, cancelled.then(|| "cancelled".to_string()));
            if let Err(e) = self.updates.update(&record).await {
                warn!("Audit record finalize failed: {}", e);
            }
        }

        // Post-download analysis. Skipped on cancellation: the journal
        // has already been kept current.
        if !cancelled {
            self.post_run_analysis(spec, end).await;
        }

        let progress = self.progress_snapshot();
        let outcome = DownloadOutcome {
            batch_id,
            processed: progress.processed_instruments,
            successful: progress.successful_downloads,
            failed: progress.failed_downloads,
            total_quotes: progress.total_quotes,
            quality_issues: progress.quality_issues,
            gaps_detected: progress.data_gaps_detected,
            cancelled,
        };
        info!(
            "Download run {} finished: {} processed, {} quotes, cancelled: {}",
            outcome.batch_id, outcome.processed, outcome.total_quotes, outcome.cancelled
        );
        Ok(outcome)
    }

    /// Fetch, score and commit one batch. Returns `(rows_written,
    /// had_failures)`.
    async fn process_batch(
        &self,
        batch: &[Instrument],
        threshold: f64,
        ctx: &RunContext,
    ) -> (usize, bool) {
        let concurrency = self.config.max_concurrent.clamp(1, MAX_CONCURRENT_LIMIT);
        let outcomes: Vec<InstrumentOutcome> = stream::iter(batch.iter())
            .map(|instrument| self.download_instrument(instrument, ctx))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut batch_rows: Vec<DailyQuote> = Vec::new();
        let mut rejected = 0usize;
        let mut failed_count = 0usize;
        let mut score_sum = 0.0f64;

        for outcome in outcomes {
            rejected += outcome.rejected;
            if let Some(error) = outcome.error {
                failed_count += 1;
                self.with_progress(|p| p.add_error(error.clone()));
            } else {
                for quote in &outcome.quotes {
                    score_sum += quote.quality_score;
                }
                batch_rows.extend(outcome.quotes);
            }
        }

        self.with_progress(|p| {
            p.failed_downloads += failed_count;
            p.quality_issues += rejected;
        });

        let mut written = 0usize;
        if !batch_rows.is_empty() {
            match self.quotes.upsert_quotes(&batch_rows).await {
                Ok(count) => {
                    written = count;
                    let mean = score_sum / batch_rows.len() as f64;
                    let below = mean < threshold;
                    self.with_progress(|p| {
                        p.successful_downloads += batch.len() - failed_count;
                        p.total_quotes += batch_rows.len();
                        if below {
                            p.quality_issues += batch_rows.len();
                        }
                    });
                    info!(
                        "Committed batch: {} quotes, mean quality {:.2}",
                        batch_rows.len(),
                        mean
                    );
                }
                Err(e) => {
                    error!("Batch store failed: {}", e);
                    self.with_progress(|p| {
                        p.failed_downloads += batch.len() - failed_count;
                        p.add_error(format!("batch store failed: {}", e));
                    });
                    failed_count = batch.len();
                }
            }
        }

        self.with_progress(|p| p.processed_instruments += batch.len());
        (written, failed_count > 0)
    }

    /// Fetch one instrument's window chunk by chunk, then run the quality
    /// stage over the accumulated rows. Per-instrument failures are
    /// contained here; they never abort the batch.
    async fn download_instrument(
        &self,
        instrument: &Instrument,
        ctx: &RunContext,
    ) -> InstrumentOutcome {
        let (y, m, d) = DEFAULT_HISTORY_START;
        let w1 = ctx
            .start
            .or(instrument.listed_date)
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(y, m, d).expect("valid epoch"));

        let mut items = match self.plan_with_refresh(instrument, w1, ctx.end).await {
            Ok(items) => items,
            Err(e) => {
                return InstrumentOutcome::failed(format!(
                    "{}: planning failed: {}",
                    instrument.instrument_id, e
                ))
            }
        };

        // Incremental pruning: drop days already stored, and whole chunks
        // once nothing in them is missing.
        if ctx.prune_stored {
            let stored = match self
                .quotes
                .existing_dates(&instrument.instrument_id, w1, ctx.end)
            {
                Ok(stored) => stored,
                Err(e) => {
                    return InstrumentOutcome::failed(format!(
                        "{}: stored-date lookup failed: {}",
                        instrument.instrument_id, e
                    ))
                }
            };
            items.retain_mut(|item| {
                item.expected_days.retain(|day| !stored.contains(day));
                match (item.expected_days.first(), item.expected_days.last()) {
                    (Some(&first), Some(&last)) => {
                        item.first = first;
                        item.last = last;
                        true
                    }
                    _ => false,
                }
            });
        }
        if items.is_empty() {
            return InstrumentOutcome {
                quotes: Vec::new(),
                rejected: 0,
                error: None,
            };
        }

        let mut raw = Vec::new();
        let chunk_count = items.len();
        for (index, item) in items.iter().enumerate() {
            if ctx.token.is_cancelled() {
                // Keep what we have; the upsert is idempotent and the
                // next resume re-plans this instrument.
                break;
            }

            match timeout(
                self.config.fetch_timeout,
                self.market_data.fetch_daily(
                    &item.instrument_id,
                    &item.symbol,
                    item.first,
                    item.last,
                ),
            )
            .await
            {
                Ok(Ok(rows)) => raw.extend(rows),
                Ok(Err(e)) => {
                    return InstrumentOutcome::failed(format!(
                        "{}: fetch {}..{} failed: {}",
                        instrument.instrument_id, item.first, item.last, e
                    ))
                }
                Err(_) => {
                    return InstrumentOutcome::failed(format!(
                        "{}: fetch {}..{} timed out",
                        instrument.instrument_id, item.first, item.last
                    ))
                }
            }

            if index + 1 < chunk_count {
                tokio::time::sleep(self.config.inter_chunk_delay).await;
            }
        }

        let expected: BTreeSet<NaiveDate> = items
            .iter()
            .flat_map(|item| item.expected_days.iter().copied())
            .collect();
        let processed = self.quality.process(raw, &expected, &ctx.batch_id);

        InstrumentOutcome {
            quotes: processed.quotes,
            rejected: processed.rejected,
            error: None,
        }
    }

    /// Plan, refreshing the calendar once if the window is unknown.
    async fn plan_with_refresh(
        &self,
        instrument: &Instrument,
        w1: NaiveDate,
        w2: NaiveDate,
    ) -> Result<Vec<super::planner::WorkItem>> {
        match self.planner.plan(instrument, w1, w2).await {
            Err(Error::CalendarUnknown { exchange, .. }) => {
                info!(
                    "Calendar unknown for {} {}..{}, refreshing",
                    exchange, w1, w2
                );
                self.market_data
                    .update_trading_calendar(exchange, w1, w2)
                    .await?;
                self.planner.plan(instrument, w1, w2).await
            }
            other => other,
        }
    }

    async fn post_run_analysis(&self, spec: &DownloadSpec, end: NaiveDate) {
        let gaps = match self.gap_engine.detect(&spec.exchanges, spec.start, end).await {
            Ok(gaps) => gaps,
            Err(e) => {
                error!("Post-download gap analysis failed: {}", e);
                return;
            }
        };
        self.with_progress(|p| p.data_gaps_detected = gaps.len());
        info!("Post-download analysis found {} gaps", gaps.len());

        let progress = self.progress_snapshot();
        let stats = self.maintenance.snapshot_stats().ok();
        if let Err(e) = self
            .reports
            .write_download_report(&progress, stats.as_ref())
            .await
        {
            error!("Download report failed: {}", e);
        }
        if let Err(e) = self.reports.write_analysis_report(&progress, &gaps).await {
            error!("Analysis report failed: {}", e);
        }
    }

    /// Incremental daily update: one target trading day per exchange,
    /// trusting the stored calendar (sub-window runs never force a
    /// refresh; unknown windows still trigger one through the planner).
    pub async fn run_daily_update(
        &self,
        exchanges: Vec<Exchange>,
        target: Option<NaiveDate>,
    ) -> Result<serde_json::Value> {
        let target = target.unwrap_or_else(session_today);
        let mut active = Vec::new();
        let mut skipped = Vec::new();

        for &exchange in &exchanges {
            match self
                .planner
                .calendar()
                .is_trading_day(exchange, target)
                .await
            {
                Ok(true) => active.push(exchange),
                Ok(false) => {
                    info!("{} closed on {}, skipping daily update", exchange, target);
                    skipped.push(json!({
                        "exchange": exchange.code(),
                        "reason": "non-trading day",
                    }));
                }
                Err(e) => {
                    warn!("Calendar lookup failed for {} on {}: {}", exchange, target, e);
                    skipped.push(json!({
                        "exchange": exchange.code(),
                        "reason": e.to_string(),
                    }));
                }
            }
        }

        let outcome = if active.is_empty() {
            None
        } else {
            let spec = DownloadSpec {
                exchanges: active.clone(),
                start: Some(target),
                end: Some(target),
                quality_threshold: None,
                resume: false,
                force_update_calendar: Some(false),
            };
            Some(self.run(spec).await?)
        };

        let body = json!({
            "target_date": target.format("%Y-%m-%d").to_string(),
            "exchanges_updated": active.iter().map(|e| e.code()).collect::<Vec<_>>(),
            "exchanges_skipped": skipped,
            "outcome": outcome,
        });
        self.reports
            .write_daily_update_report(target, body.clone())
            .await?;
        Ok(body)
    }

    fn with_progress(&self, f: impl FnOnce(&mut DownloadProgress)) {
        let mut progress = self.progress.write().expect("progress lock");
        f(&mut progress);
    }

    async fn save_journal(&self) {
        let snapshot = self.progress_snapshot();
        if let Err(e) = self.journal.save(&snapshot).await {
            error!("Progress journal save failed: {}", e);
        }
    }
}
