//! The persisted daily quote row.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quotehub_market_data::InstrumentId;

/// How a bar relates to corporate-action-adjusted pricing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    #[default]
    None,
    Forward,
    Backward,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::None => "none",
            AdjustmentType::Forward => "forward",
            AdjustmentType::Backward => "backward",
        }
    }

    pub fn parse(s: &str) -> AdjustmentType {
        match s {
            "forward" => AdjustmentType::Forward,
            "backward" => AdjustmentType::Backward,
            _ => AdjustmentType::None,
        }
    }

    /// Classify from the adjustment factor.
    pub fn from_factor(factor: Decimal) -> AdjustmentType {
        if factor == Decimal::ONE {
            AdjustmentType::None
        } else if factor > Decimal::ONE {
            AdjustmentType::Forward
        } else {
            AdjustmentType::Backward
        }
    }
}

/// One day's OHLCV row for one instrument.
///
/// Identity is `(day, instrument_id)`; [`id`](Self::id) derives the
/// storage key from exactly those two fields, so the store can hold at
/// most one row per pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyQuote {
    pub day: NaiveDate,
    pub instrument_id: InstrumentId,

    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub pre_close: Option<Decimal>,
    pub change: Option<Decimal>,
    pub pct_change: Option<Decimal>,

    pub volume: i64,
    pub amount: Decimal,
    pub turnover: Option<Decimal>,

    /// 1 = normal session, 0 = suspended.
    pub tradestatus: i32,

    pub factor: Decimal,
    pub adjustment_type: AdjustmentType,

    pub is_complete: bool,
    /// Composite quality score in [0, 1].
    pub quality_score: f64,

    pub source: Option<String>,
    pub batch_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyQuote {
    /// Storage key derived from `(day, instrument_id)`.
    pub fn id(&self) -> String {
        Self::key(self.day, &self.instrument_id)
    }

    pub fn key(day: NaiveDate, instrument_id: &InstrumentId) -> String {
        format!("{}_{}", day.format("%Y-%m-%d"), instrument_id.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotehub_market_data::Exchange;
    use rust_decimal_macros::dec;

    #[test]
    fn test_adjustment_from_factor() {
        assert_eq!(AdjustmentType::from_factor(dec!(1)), AdjustmentType::None);
        assert_eq!(
            AdjustmentType::from_factor(dec!(1.25)),
            AdjustmentType::Forward
        );
        assert_eq!(
            AdjustmentType::from_factor(dec!(0.8)),
            AdjustmentType::Backward
        );
    }

    #[test]
    fn test_key_binds_day_and_instrument() {
        let id = InstrumentId::new("600000", Exchange::Sse).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(DailyQuote::key(day, &id), "2024-01-02_600000.SSE");
    }
}
