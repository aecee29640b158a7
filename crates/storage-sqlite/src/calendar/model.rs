//! Database model for trading calendar rows.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use quotehub_core::models::TradingCalendarEntry;
use quotehub_core::{Exchange, Result};

use crate::errors::StorageError;
use crate::utils::{fmt_date, fmt_datetime, parse_date, parse_datetime};

#[derive(
    Queryable, Identifiable, Selectable, Insertable, AsChangeset, Debug, Clone, Serialize, Deserialize,
)]
#[diesel(table_name = crate::schema::trading_calendar)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CalendarEntryDB {
    pub id: String,
    pub exchange: String,
    pub day: String,
    pub is_trading_day: bool,
    pub reason: Option<String>,
    pub session_type: Option<String>,
    pub source: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&TradingCalendarEntry> for CalendarEntryDB {
    fn from(entry: &TradingCalendarEntry) -> Self {
        CalendarEntryDB {
            id: entry.id(),
            exchange: entry.exchange.code().to_string(),
            day: fmt_date(entry.day),
            is_trading_day: entry.is_trading_day,
            reason: entry.reason.clone(),
            session_type: entry.session_type.clone(),
            source: entry.source.clone(),
            created_at: fmt_datetime(entry.created_at),
            updated_at: fmt_datetime(entry.updated_at),
        }
    }
}

impl CalendarEntryDB {
    pub fn into_domain(self) -> Result<TradingCalendarEntry> {
        let exchange = Exchange::from_code(&self.exchange)
            .map_err(|e| StorageError::Conversion(format!("exchange {:?}: {}", self.exchange, e)))?;
        let day = parse_date(&self.day)
            .ok_or_else(|| StorageError::Conversion(format!("day {:?}", self.day)))?;

        Ok(TradingCalendarEntry {
            exchange,
            day,
            is_trading_day: self.is_trading_day,
            reason: self.reason,
            session_type: self.session_type,
            source: self.source,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}
