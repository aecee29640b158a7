//! Gap detection and repair.
//!
//! A gap is a maximal run of consecutive missing trading days for one
//! instrument within a window. Detection diffs the expected trading-day
//! set against stored quote dates; repair refetches each accepted gap
//! through the provider chain and upserts the result. Repair never
//! deletes rows, and days the upstream genuinely has nothing for stay in
//! the report.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use quotehub_market_data::{Exchange, InstrumentId};

use crate::calendar::CalendarService;
use crate::constants::GAP_FILL_DELAY;
use crate::errors::Result;
use crate::market_data::MarketDataService;
use crate::models::Instrument;
use crate::quality::QualityStage;
use crate::store::{InstrumentFilter, InstrumentSort, InstrumentStore, Page, QuoteStore};
use crate::time::{new_batch_id, session_today};

/// Gap severity, driven by run length in calendar days.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl GapSeverity {
    /// Monotone in `days`.
    pub fn from_days(days: i64) -> GapSeverity {
        match days {
            i64::MIN..=1 => GapSeverity::Low,
            2..=5 => GapSeverity::Medium,
            6..=20 => GapSeverity::High,
            _ => GapSeverity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GapSeverity::Low => "low",
            GapSeverity::Medium => "medium",
            GapSeverity::High => "high",
            GapSeverity::Critical => "critical",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            GapSeverity::Low => "Monitor in next update",
            GapSeverity::Medium => "Schedule immediate fill",
            GapSeverity::High => "Prioritize for data completion",
            GapSeverity::Critical => "Investigate cause - possible delisting or suspension",
        }
    }
}

/// One detected gap.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gap {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub exchange: Exchange,
    pub first: NaiveDate,
    pub last: NaiveDate,
    /// Calendar days spanned: `last - first + 1`.
    pub days: i64,
    pub gap_type: String,
    pub severity: GapSeverity,
    pub recommendation: String,
    /// The exact trading days missing inside the run.
    pub missing_dates: Vec<NaiveDate>,
}

/// Filters accepted by [`GapEngine::fill`].
#[derive(Clone, Debug, Default)]
pub struct GapFillFilter {
    pub exchanges: Option<Vec<Exchange>>,
    pub instrument_ids: Option<Vec<InstrumentId>>,
    pub severities: Option<Vec<GapSeverity>>,
    pub gap_types: Option<Vec<String>>,
    pub max_days: Option<i64>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub dry_run: bool,
}

/// Outcome of one repair pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapFillOutcome {
    pub found: usize,
    pub filled: usize,
    pub failed: usize,
    /// `(instrument_id, reason)` for each failure.
    pub failures: Vec<(String, String)>,
}

/// Detects and repairs missing date ranges.
pub struct GapEngine {
    instruments: Arc<dyn InstrumentStore>,
    quotes: Arc<dyn QuoteStore>,
    calendar: Arc<CalendarService>,
    market_data: Arc<MarketDataService>,
    quality: QualityStage,
}

impl GapEngine {
    pub fn new(
        instruments: Arc<dyn InstrumentStore>,
        quotes: Arc<dyn QuoteStore>,
        calendar: Arc<CalendarService>,
        market_data: Arc<MarketDataService>,
    ) -> Self {
        Self {
            instruments,
            quotes,
            calendar,
            market_data,
            quality: QualityStage::new(),
        }
    }

    /// Detect gaps for every active instrument of the given exchanges.
    ///
    /// Deterministic for fixed calendar and stored dates; instruments
    /// whose calendar window is unknown are skipped with a log line
    /// rather than failing the whole pass.
    pub async fn detect(
        &self,
        exchanges: &[Exchange],
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<Vec<Gap>> {
        let mut gaps = Vec::new();

        for &exchange in exchanges {
            let instruments = self.instruments.list(
                &InstrumentFilter::active_on(exchange),
                InstrumentSort::Symbol,
                Page::all(),
            )?;

            for instrument in &instruments {
                match self.detect_for_instrument(instrument, start, end).await {
                    Ok(mut found) => gaps.append(&mut found),
                    Err(e) => {
                        error!(
                            "Gap detection failed for {}: {}",
                            instrument.instrument_id, e
                        );
                    }
                }
            }
        }

        Ok(gaps)
    }

    async fn detect_for_instrument(
        &self,
        instrument: &Instrument,
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<Vec<Gap>> {
        // Effective window: the request clipped to the listing lifetime.
        // Without either a start or a listed date there is nothing to
        // measure against.
        let start = match (start, instrument.listed_date) {
            (Some(s), Some(listed)) => s.max(listed),
            (Some(s), None) => s,
            (None, Some(listed)) => listed,
            (None, None) => return Ok(vec![]),
        };
        let end = match instrument.delisted_date {
            Some(delisted) => end.min(delisted),
            None => end,
        };
        if start > end {
            return Ok(vec![]);
        }

        let expected: BTreeSet<NaiveDate> = self
            .calendar
            .trading_days_in(instrument.exchange, start, end)
            .await?
            .into_iter()
            .collect();
        let stored = self
            .quotes
            .existing_dates(&instrument.instrument_id, start, end)?;

        let missing: Vec<NaiveDate> = expected.difference(&stored).copied().collect();
        if missing.is_empty() {
            return Ok(vec![]);
        }

        debug!(
            "{}: {} expected, {} stored, {} missing",
            instrument.instrument_id,
            expected.len(),
            stored.len(),
            missing.len()
        );

        Ok(merge_consecutive(&missing)
            .into_iter()
            .map(|run| {
                let first = run[0];
                let last = *run.last().expect("run is never empty");
                let days = (last - first).num_days() + 1;
                let severity = GapSeverity::from_days(days);
                Gap {
                    instrument_id: instrument.instrument_id.clone(),
                    symbol: instrument.symbol.clone(),
                    exchange: instrument.exchange,
                    first,
                    last,
                    days,
                    gap_type: "missing_data".to_string(),
                    severity,
                    recommendation: severity.recommendation().to_string(),
                    missing_dates: run,
                }
            })
            .collect())
    }

    /// Repair gaps matching the filter. Each accepted gap is refetched
    /// over `[first, last]`, quality-processed and upserted; existing
    /// rows are never deleted.
    pub async fn fill(&self, filter: &GapFillFilter) -> Result<GapFillOutcome> {
        let end = filter.end.unwrap_or_else(session_today);
        let exchanges = filter
            .exchanges
            .clone()
            .unwrap_or_else(|| vec![Exchange::Sse, Exchange::Szse, Exchange::Bse]);

        let mut gaps = self.detect(&exchanges, filter.start, end).await?;

        if let Some(ids) = &filter.instrument_ids {
            gaps.retain(|g| ids.contains(&g.instrument_id));
        }
        if let Some(severities) = &filter.severities {
            gaps.retain(|g| severities.contains(&g.severity));
        }
        if let Some(types) = &filter.gap_types {
            gaps.retain(|g| types.contains(&g.gap_type));
        }
        if let Some(max_days) = filter.max_days {
            gaps.retain(|g| g.days <= max_days);
        }

        let mut outcome = GapFillOutcome {
            found: gaps.len(),
            ..GapFillOutcome::default()
        };
        info!("Gap fill: {} gaps accepted by filter", gaps.len());

        if filter.dry_run {
            return Ok(outcome);
        }

        let batch_id = format!("gapfill_{}", new_batch_id());
        for gap in &gaps {
            match self.fill_one(gap, &batch_id).await {
                Ok(true) => outcome.filled += 1,
                Ok(false) => {
                    outcome.failed += 1;
                    outcome.failures.push((
                        gap.instrument_id.canonical(),
                        "no data returned for gap window".to_string(),
                    ));
                }
                Err(e) => {
                    outcome.failed += 1;
                    outcome
                        .failures
                        .push((gap.instrument_id.canonical(), e.to_string()));
                }
            }
            // Throttle between repairs; the rate limiter already paces
            // the provider, this spaces out store churn as well.
            tokio::time::sleep(GAP_FILL_DELAY).await;
        }

        Ok(outcome)
    }

    async fn fill_one(&self, gap: &Gap, batch_id: &str) -> Result<bool> {
        // Resolve the instrument; fall back to the symbol for rows keyed
        // by a historical spelling.
        let instrument = match self.instruments.get_by_id(&gap.instrument_id)? {
            Some(instrument) => instrument,
            None => match self.instruments.get_by_symbol(&gap.symbol)? {
                Some(instrument) => instrument,
                None => {
                    warn!("Gap fill skipped: instrument not found {}", gap.instrument_id);
                    return Ok(false);
                }
            },
        };

        let raw = self
            .market_data
            .fetch_daily(
                &instrument.instrument_id,
                &instrument.symbol,
                gap.first,
                gap.last,
            )
            .await?;
        if raw.is_empty() {
            return Ok(false);
        }

        // Expand the expected set a little so scoring does not punish
        // providers returning the surrounding days.
        let expected: BTreeSet<NaiveDate> = self
            .calendar
            .trading_days_in(
                instrument.exchange,
                gap.first - Duration::days(7),
                gap.last + Duration::days(7),
            )
            .await
            .unwrap_or_default()
            .into_iter()
            .collect();

        let processed = self.quality.process(raw, &expected, batch_id);
        if processed.quotes.is_empty() {
            return Ok(false);
        }

        let written = self.quotes.upsert_quotes(&processed.quotes).await?;
        info!(
            "Filled gap for {}: {} to {} ({} rows)",
            gap.instrument_id, gap.first, gap.last, written
        );
        Ok(written > 0)
    }
}

/// Merge sorted dates into maximal runs of consecutive calendar days.
fn merge_consecutive(dates: &[NaiveDate]) -> Vec<Vec<NaiveDate>> {
    let mut runs: Vec<Vec<NaiveDate>> = Vec::new();

    for &date in dates {
        match runs.last_mut() {
            Some(run) if (date - *run.last().expect("run is never empty")).num_days() == 1 => {
                run.push(date);
            }
            _ => runs.push(vec![date]),
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_merge_consecutive_runs() {
        let dates = vec![day(3), day(4), day(8), day(10), day(11), day(12)];
        let runs = merge_consecutive(&dates);

        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], vec![day(3), day(4)]);
        assert_eq!(runs[1], vec![day(8)]);
        assert_eq!(runs[2], vec![day(10), day(11), day(12)]);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_consecutive(&[]).is_empty());
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(GapSeverity::from_days(1), GapSeverity::Low);
        assert_eq!(GapSeverity::from_days(2), GapSeverity::Medium);
        assert_eq!(GapSeverity::from_days(5), GapSeverity::Medium);
        assert_eq!(GapSeverity::from_days(6), GapSeverity::High);
        assert_eq!(GapSeverity::from_days(20), GapSeverity::High);
        assert_eq!(GapSeverity::from_days(21), GapSeverity::Critical);
    }

    #[test]
    fn test_severity_monotone_in_days() {
        let mut last = GapSeverity::Low;
        for days in 0..40 {
            let severity = GapSeverity::from_days(days);
            assert!(severity >= last, "severity regressed at {} days", days);
            last = severity;
        }
    }
}
