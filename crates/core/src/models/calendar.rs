//! Trading calendar rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use quotehub_market_data::{CalendarDay, Exchange};

/// One `(exchange, date)` calendar row. At most one exists per pair; the
/// storage key is derived from exactly those two fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingCalendarEntry {
    pub exchange: Exchange,
    pub day: NaiveDate,
    pub is_trading_day: bool,
    /// Why the market is closed, when known (holiday name etc.).
    pub reason: Option<String>,
    pub session_type: Option<String>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradingCalendarEntry {
    pub fn id(&self) -> String {
        Self::key(self.exchange, self.day)
    }

    pub fn key(exchange: Exchange, day: NaiveDate) -> String {
        format!("{}_{}", exchange.code(), day.format("%Y-%m-%d"))
    }

    pub fn from_provider(day: CalendarDay, source: &str) -> Self {
        let now = Utc::now();
        TradingCalendarEntry {
            exchange: day.exchange,
            day: day.day,
            is_trading_day: day.is_trading_day,
            reason: day.reason,
            session_type: None,
            source: Some(source.to_string()),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_exchange_and_day() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            TradingCalendarEntry::key(Exchange::Sse, day),
            "SSE_2024-01-02"
        );
    }
}
