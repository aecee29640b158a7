//! Read-side query service.
//!
//! Filtered reads over the store with pagination, response statistics and
//! CSV export. This is the layer the HTTP façade calls; it owns parameter
//! validation and response assembly, nothing else.

use std::sync::Arc;

use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quotehub_market_data::{Exchange, InstrumentId};

use crate::constants::{DEFAULT_LATEST_LOOKBACK_DAYS, DEFAULT_QUALITY_THRESHOLD};
use crate::errors::{Error, Result};
use crate::models::{DailyQuote, Instrument};
use crate::store::{
    InstrumentFilter, InstrumentSort, InstrumentStore, Page, QuoteFilter, QuoteStore,
};

/// Output shape for quote queries.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Rows,
    Csv,
}

/// One quote query.
#[derive(Clone, Debug, Default)]
pub struct QuoteRequest {
    /// Canonical or native id; either this or `symbol` is required.
    pub instrument_id: Option<String>,
    pub symbol: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub tradestatus: Option<i32>,
    pub min_volume: Option<i64>,
    pub min_quality_score: Option<f64>,
    pub include_suspended: bool,
    pub include_quality: bool,
    pub format: ResponseFormat,
    pub page: Option<Page>,
}

/// Computed statistics over the returned window.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteStatistics {
    pub count: usize,
    pub min_close: Option<Decimal>,
    pub max_close: Option<Decimal>,
    pub mean_volume: Option<f64>,
    pub trading_day_count: usize,
}

/// Quality roll-up over the returned window.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySummary {
    pub average_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub below_threshold: usize,
    pub threshold: f64,
}

/// The assembled quote response envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub exchange: Exchange,
    pub data: Vec<DailyQuote>,
    pub total_records: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QuoteStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_summary: Option<QualitySummary>,
}

/// Rows or rendered CSV, per the request's format.
#[derive(Clone, Debug)]
pub enum QuotePayload {
    Rows(QuoteResponse),
    Csv(String),
}

/// Parameters for instrument listings.
#[derive(Clone, Debug, Default)]
pub struct InstrumentQuery {
    pub filter: InstrumentFilter,
    pub sort: InstrumentSort,
    pub page: Page,
}

/// The read-only query surface.
pub struct QuoteQueryService {
    instruments: Arc<dyn InstrumentStore>,
    quotes: Arc<dyn QuoteStore>,
}

impl QuoteQueryService {
    pub fn new(instruments: Arc<dyn InstrumentStore>, quotes: Arc<dyn QuoteStore>) -> Self {
        Self {
            instruments,
            quotes,
        }
    }

    /// Filtered instrument listing.
    pub fn get_instruments(&self, query: &InstrumentQuery) -> Result<Vec<Instrument>> {
        self.instruments.list(&query.filter, query.sort, query.page)
    }

    pub fn get_instrument_by_id(&self, id: &str) -> Result<Instrument> {
        let instrument_id = InstrumentId::parse_any(id).map_err(Error::from)?;
        self.instruments
            .get_by_id(&instrument_id)?
            .ok_or_else(|| Error::NotFound(format!("instrument {}", id)))
    }

    pub fn get_instrument_by_symbol(&self, symbol: &str) -> Result<Instrument> {
        self.instruments
            .get_by_symbol(symbol)?
            .ok_or_else(|| Error::NotFound(format!("symbol {}", symbol)))
    }

    /// Quote query with response assembly.
    pub fn get_quotes(&self, request: &QuoteRequest) -> Result<QuotePayload> {
        let instrument = self.resolve_instrument(request)?;

        if let (Some(start), Some(end)) = (request.start, request.end) {
            if start > end {
                return Err(Error::InvalidInput(format!(
                    "start {} is after end {}",
                    start, end
                )));
            }
        }

        let filter = QuoteFilter {
            instrument_id: Some(instrument.instrument_id.clone()),
            start: request.start,
            end: request.end,
            tradestatus: request.tradestatus,
            min_volume: request.min_volume,
            min_quality_score: request.min_quality_score,
            include_suspended: request.include_suspended,
            page: request.page,
        };
        let rows = self.quotes.query(&filter)?;
        debug!(
            "Quote query for {} returned {} rows",
            instrument.instrument_id,
            rows.len()
        );

        if request.format == ResponseFormat::Csv {
            return Ok(QuotePayload::Csv(render_csv(&rows)?));
        }

        let stats = Some(statistics(&rows));
        let quality_summary = request
            .include_quality
            .then(|| quality_summary(&rows, DEFAULT_QUALITY_THRESHOLD))
            .flatten();

        Ok(QuotePayload::Rows(QuoteResponse {
            instrument_id: instrument.instrument_id.clone(),
            symbol: instrument.symbol.clone(),
            exchange: instrument.exchange,
            total_records: rows.len(),
            start_date: rows.first().map(|q| q.day),
            end_date: rows.last().map(|q| q.day),
            data: rows,
            stats,
            quality_summary,
        }))
    }

    /// For each id, the newest row within the lookback window.
    pub fn get_latest_quotes(
        &self,
        ids: &[String],
        lookback_days: Option<i64>,
    ) -> Result<Vec<DailyQuote>> {
        let lookback = lookback_days.unwrap_or(DEFAULT_LATEST_LOOKBACK_DAYS);
        if lookback <= 0 {
            return Err(Error::InvalidInput("lookback must be positive".into()));
        }

        let instrument_ids: Vec<InstrumentId> = ids
            .iter()
            .map(|id| InstrumentId::parse_any(id).map_err(Error::from))
            .collect::<Result<_>>()?;

        self.quotes.latest_quotes(&instrument_ids, lookback)
    }

    fn resolve_instrument(&self, request: &QuoteRequest) -> Result<Instrument> {
        if let Some(id) = &request.instrument_id {
            return self.get_instrument_by_id(id);
        }
        if let Some(symbol) = &request.symbol {
            return self.get_instrument_by_symbol(symbol);
        }
        Err(Error::InvalidInput(
            "either instrument_id or symbol is required".into(),
        ))
    }
}

fn statistics(rows: &[DailyQuote]) -> QuoteStatistics {
    let closes: Vec<Decimal> = rows.iter().map(|q| q.close).collect();
    let mean_volume = if rows.is_empty() {
        None
    } else {
        Some(rows.iter().map(|q| q.volume as f64).sum::<f64>() / rows.len() as f64)
    };

    QuoteStatistics {
        count: rows.len(),
        min_close: closes.iter().min().copied(),
        max_close: closes.iter().max().copied(),
        mean_volume,
        trading_day_count: rows.iter().filter(|q| q.tradestatus == 1).count(),
    }
}

fn quality_summary(rows: &[DailyQuote], threshold: f64) -> Option<QualitySummary> {
    if rows.is_empty() {
        return None;
    }

    let scores: Vec<f64> = rows.iter().map(|q| q.quality_score).collect();
    let sum: f64 = scores.iter().sum();
    Some(QualitySummary {
        average_score: sum / scores.len() as f64,
        min_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
        max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        below_threshold: scores.iter().filter(|s| **s < threshold).count(),
        threshold,
    })
}

/// Render rows as CSV with a fixed column set.
fn render_csv(rows: &[DailyQuote]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "day",
            "instrument_id",
            "open",
            "high",
            "low",
            "close",
            "pre_close",
            "change",
            "pct_change",
            "volume",
            "amount",
            "tradestatus",
            "quality_score",
        ])
        .map_err(|e| Error::Unexpected(format!("csv header: {}", e)))?;

    for row in rows {
        writer
            .write_record([
                row.day.format("%Y-%m-%d").to_string(),
                row.instrument_id.canonical(),
                row.open.to_string(),
                row.high.to_string(),
                row.low.to_string(),
                row.close.to_string(),
                row.pre_close.map(|v| v.to_string()).unwrap_or_default(),
                row.change.map(|v| v.to_string()).unwrap_or_default(),
                row.pct_change.map(|v| v.to_string()).unwrap_or_default(),
                row.volume.to_string(),
                row.amount.to_string(),
                row.tradestatus.to_string(),
                format!("{:.2}", row.quality_score),
            ])
            .map_err(|e| Error::Unexpected(format!("csv row: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Unexpected(format!("csv flush: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Unexpected(format!("csv utf8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn quote(d: u32, close: Decimal, score: f64) -> DailyQuote {
        let id = InstrumentId::new("600000", Exchange::Sse).unwrap();
        let now = Utc::now();
        DailyQuote {
            day: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            instrument_id: id,
            open: dec!(10),
            high: dec!(11),
            low: dec!(9.5),
            close,
            pre_close: Some(dec!(10)),
            change: Some(close - dec!(10)),
            pct_change: Some(dec!(0)),
            volume: 1_000,
            amount: dec!(10000),
            turnover: None,
            tradestatus: 1,
            factor: dec!(1),
            adjustment_type: crate::models::AdjustmentType::None,
            is_complete: true,
            quality_score: score,
            source: Some("TEST".to_string()),
            batch_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_statistics() {
        let rows = vec![
            quote(2, dec!(10.0), 1.0),
            quote(3, dec!(12.0), 0.9),
            quote(4, dec!(9.0), 0.6),
        ];
        let stats = statistics(&rows);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_close, Some(dec!(9.0)));
        assert_eq!(stats.max_close, Some(dec!(12.0)));
        assert_eq!(stats.trading_day_count, 3);
        assert!((stats.mean_volume.unwrap() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_summary_counts_below_threshold() {
        let rows = vec![
            quote(2, dec!(10), 1.0),
            quote(3, dec!(10), 0.65),
            quote(4, dec!(10), 0.3),
        ];
        let summary = quality_summary(&rows, 0.7).unwrap();
        assert_eq!(summary.below_threshold, 2);
        assert!((summary.min_score - 0.3).abs() < 1e-9);
        assert!((summary.max_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_summary_empty_is_none() {
        assert!(quality_summary(&[], 0.7).is_none());
    }

    #[test]
    fn test_csv_rendering() {
        let rows = vec![quote(2, dec!(10.8), 1.0)];
        let csv = render_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("day,instrument_id,open"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("2024-01-02,600000.SSE,10,"));
        assert!(row.ends_with("1.00"));
    }
}
