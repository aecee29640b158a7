//! Data-quality and normalization stage.
//!
//! Turns provider-shaped rows into persisted [`DailyQuote`] rows. Per-row,
//! in order: basic validation, pre-close/change derivation, adjustment
//! tagging, completeness check, quality scoring, provenance stamping.
//! Rows failing basic validation are dropped and counted; everything else
//! flows through annotated.
//!
//! Chronological order matters: pre-close derivation reads the previous
//! accepted row's close.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use log::debug;
use rust_decimal::Decimal;

use quotehub_market_data::RawDailyQuote;

use crate::models::{AdjustmentType, DailyQuote};

/// Score deductions. Additive, clamped to [0, 1] at the end.
const PENALTY_HIGH_BELOW_BODY: f64 = 0.1;
const PENALTY_LOW_ABOVE_BODY: f64 = 0.1;
const PENALTY_NO_VOLUME: f64 = 0.2;
const PENALTY_NOT_TRADING: f64 = 0.3;
const PENALTY_INCOMPLETE: f64 = 0.1;
const PENALTY_OFF_CALENDAR: f64 = 0.3;

/// Result of running one batch through the stage.
#[derive(Debug, Default)]
pub struct QualityOutcome {
    /// Accepted, normalized rows in chronological order.
    pub quotes: Vec<DailyQuote>,
    /// Rows dropped by basic validation.
    pub rejected: usize,
}

/// The quality stage. Stateless; one instance serves the whole pipeline.
#[derive(Clone, Default)]
pub struct QualityStage;

impl QualityStage {
    pub fn new() -> Self {
        Self
    }

    /// Process one instrument's raw rows against the planned trading-day
    /// set for its exchange.
    pub fn process(
        &self,
        mut raw: Vec<RawDailyQuote>,
        trading_days: &BTreeSet<NaiveDate>,
        batch_id: &str,
    ) -> QualityOutcome {
        raw.sort_by_key(|r| r.day);

        let mut outcome = QualityOutcome::default();
        let mut previous_close: Option<Decimal> = None;

        for row in raw {
            if !basic_valid(&row) {
                outcome.rejected += 1;
                continue;
            }

            // Derive pre_close: provider value when positive, else the
            // previous accepted close; the first row defaults to its own
            // close (zero change).
            let pre_close = row
                .pre_close
                .filter(|p| *p > Decimal::ZERO)
                .or(previous_close)
                .unwrap_or(row.close);

            let (change, pct_change) = if pre_close > Decimal::ZERO {
                let change = (row.close - pre_close).round_dp(4);
                let pct = (change / pre_close * Decimal::from(100)).round_dp(2);
                (change, pct)
            } else {
                (Decimal::ZERO, Decimal::ZERO)
            };

            if let Some(reported) = row.pct_change {
                if (reported - pct_change).abs() > Decimal::ONE {
                    debug!(
                        "Provider pct_change {} for {} on {} disagrees with derived {}",
                        reported, row.instrument_id, row.day, pct_change
                    );
                }
            }

            let adjustment_type = AdjustmentType::from_factor(row.factor);
            let amount = row.amount.unwrap_or(Decimal::ZERO);
            let is_complete = completeness(&row, amount);
            let quality_score = score(&row, is_complete, trading_days);

            previous_close = Some(row.close);

            let now = Utc::now();
            outcome.quotes.push(DailyQuote {
                day: row.day,
                instrument_id: row.instrument_id,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                pre_close: Some(pre_close),
                change: Some(change),
                pct_change: Some(pct_change),
                volume: row.volume,
                amount,
                turnover: row.turnover,
                tradestatus: row.tradestatus,
                factor: row.factor,
                adjustment_type,
                is_complete,
                quality_score,
                source: Some(row.source),
                batch_id: Some(batch_id.to_string()),
                created_at: now,
                updated_at: now,
            });
        }

        outcome
    }
}

/// Basic validation: positive prices, high >= low. Rejected rows never
/// reach the store.
fn basic_valid(row: &RawDailyQuote) -> bool {
    let prices = [row.open, row.high, row.low, row.close];
    if prices.iter().any(|p| *p <= Decimal::ZERO) {
        return false;
    }
    row.high >= row.low
}

/// Structural completeness: the full OHLC ordering holds and activity
/// fields are non-negative.
fn completeness(row: &RawDailyQuote, amount: Decimal) -> bool {
    let body_high = row.open.max(row.close);
    let body_low = row.open.min(row.close);
    row.high >= body_high
        && body_low >= row.low
        && row.low > Decimal::ZERO
        && row.volume >= 0
        && amount >= Decimal::ZERO
}

/// Additive quality score, clamped to [0, 1].
fn score(row: &RawDailyQuote, is_complete: bool, trading_days: &BTreeSet<NaiveDate>) -> f64 {
    let mut score = 1.0;

    let body_high = row.open.max(row.close);
    let body_low = row.open.min(row.close);
    if row.high < body_high {
        score -= PENALTY_HIGH_BELOW_BODY;
    }
    if row.low > body_low {
        score -= PENALTY_LOW_ABOVE_BODY;
    }
    if row.volume <= 0 {
        score -= PENALTY_NO_VOLUME;
    }
    if row.tradestatus != 1 {
        score -= PENALTY_NOT_TRADING;
    }
    if !is_complete {
        score -= PENALTY_INCOMPLETE;
    }
    // A bar claiming a normal session on a day the calendar says the
    // market was closed is suspect.
    if !trading_days.contains(&row.day) && row.tradestatus == 1 {
        score -= PENALTY_OFF_CALENDAR;
    }

    score.clamp(0.0, 1.0)
}
