//! Database model for daily quotes.
//!
//! Decimals are stored as TEXT to keep exact values; `volume` is a real
//! integer column and `quality_score` a float, both hot filter targets.

use std::str::FromStr;

use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quotehub_core::models::{AdjustmentType, DailyQuote};
use quotehub_core::{InstrumentId, Result};

use crate::errors::StorageError;
use crate::utils::{fmt_date, fmt_datetime, parse_date, parse_datetime};

#[derive(
    Queryable,
    Identifiable,
    Selectable,
    Insertable,
    AsChangeset,
    QueryableByName,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::daily_quotes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QuoteDB {
    pub id: String,
    pub day: String,
    pub instrument_id: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub pre_close: Option<String>,
    pub change: Option<String>,
    pub pct_change: Option<String>,
    pub volume: i64,
    pub amount: String,
    pub turnover: Option<String>,
    pub tradestatus: i32,
    pub factor: String,
    pub adjustment_type: String,
    pub is_complete: bool,
    pub quality_score: f64,
    pub source: Option<String>,
    pub batch_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&DailyQuote> for QuoteDB {
    fn from(quote: &DailyQuote) -> Self {
        QuoteDB {
            id: quote.id(),
            day: fmt_date(quote.day),
            instrument_id: quote.instrument_id.canonical(),
            open: quote.open.to_string(),
            high: quote.high.to_string(),
            low: quote.low.to_string(),
            close: quote.close.to_string(),
            pre_close: quote.pre_close.map(|v| v.to_string()),
            change: quote.change.map(|v| v.to_string()),
            pct_change: quote.pct_change.map(|v| v.to_string()),
            volume: quote.volume,
            amount: quote.amount.to_string(),
            turnover: quote.turnover.map(|v| v.to_string()),
            tradestatus: quote.tradestatus,
            factor: quote.factor.to_string(),
            adjustment_type: quote.adjustment_type.as_str().to_string(),
            is_complete: quote.is_complete,
            quality_score: quote.quality_score,
            source: quote.source.clone(),
            batch_id: quote.batch_id.clone(),
            created_at: fmt_datetime(quote.created_at),
            updated_at: fmt_datetime(quote.updated_at),
        }
    }
}

impl QuoteDB {
    pub fn into_domain(self) -> Result<DailyQuote> {
        let instrument_id = InstrumentId::parse_any(&self.instrument_id).map_err(|e| {
            StorageError::Conversion(format!("instrument id {:?}: {}", self.instrument_id, e))
        })?;
        let day = parse_date(&self.day)
            .ok_or_else(|| StorageError::Conversion(format!("day {:?}", self.day)))?;

        let decimal = |field: &str, value: &str| -> Result<Decimal> {
            Decimal::from_str(value)
                .map_err(|e| StorageError::Conversion(format!("{} {:?}: {}", field, value, e)).into())
        };
        let opt_decimal = |value: &Option<String>| -> Option<Decimal> {
            value.as_deref().and_then(|v| Decimal::from_str(v).ok())
        };

        Ok(DailyQuote {
            day,
            instrument_id,
            open: decimal("open", &self.open)?,
            high: decimal("high", &self.high)?,
            low: decimal("low", &self.low)?,
            close: decimal("close", &self.close)?,
            pre_close: opt_decimal(&self.pre_close),
            change: opt_decimal(&self.change),
            pct_change: opt_decimal(&self.pct_change),
            volume: self.volume,
            amount: decimal("amount", &self.amount)?,
            turnover: opt_decimal(&self.turnover),
            tradestatus: self.tradestatus,
            factor: decimal("factor", &self.factor)?,
            adjustment_type: AdjustmentType::parse(&self.adjustment_type),
            is_complete: self.is_complete,
            quality_score: self.quality_score,
            source: self.source,
            batch_id: self.batch_id,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}
