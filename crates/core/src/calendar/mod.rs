//! Trading-calendar primitives.
//!
//! Thin service over [`CalendarStore`] with a lock-protected, read-mostly
//! memo for point lookups. The cardinal rule: a window with no stored
//! calendar rows is *unknown*, not closed — callers get
//! [`Error::CalendarUnknown`] and are expected to refresh the calendar
//! before planning any work over that window.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use log::debug;
use tokio::sync::RwLock;

use quotehub_market_data::Exchange;

use crate::constants::TRADING_DAY_SCAN_LIMIT;
use crate::errors::{Error, Result};
use crate::store::CalendarStore;

/// Calendar lookups backed by the store.
pub struct CalendarService {
    store: Arc<dyn CalendarStore>,
    /// Point-lookup memo `{exchange -> {date -> is_trading_day}}`.
    memo: RwLock<HashMap<Exchange, BTreeMap<NaiveDate, bool>>>,
}

impl CalendarService {
    pub fn new(store: Arc<dyn CalendarStore>) -> Self {
        Self {
            store,
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `day` is a trading day. Unknown dates are an error, not a
    /// "no".
    pub async fn is_trading_day(&self, exchange: Exchange, day: NaiveDate) -> Result<bool> {
        {
            let memo = self.memo.read().await;
            if let Some(known) = memo.get(&exchange).and_then(|days| days.get(&day)) {
                return Ok(*known);
            }
        }

        let entries = self.store.entries(exchange, day, day)?;
        let Some(entry) = entries.first() else {
            return Err(Error::CalendarUnknown {
                exchange,
                start: day,
                end: day,
            });
        };

        let mut memo = self.memo.write().await;
        memo.entry(exchange)
            .or_default()
            .insert(day, entry.is_trading_day);
        Ok(entry.is_trading_day)
    }

    /// All trading days in `[start, end]`, sorted ascending.
    ///
    /// Errors with [`Error::CalendarUnknown`] when the store holds no
    /// calendar rows at all for the window.
    pub async fn trading_days_in(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>> {
        if start > end {
            return Ok(vec![]);
        }

        let entries = self.store.entries(exchange, start, end)?;
        if entries.is_empty() {
            return Err(Error::CalendarUnknown {
                exchange,
                start,
                end,
            });
        }

        {
            let mut memo = self.memo.write().await;
            let days = memo.entry(exchange).or_default();
            for entry in &entries {
                days.insert(entry.day, entry.is_trading_day);
            }
        }

        Ok(entries
            .iter()
            .filter(|e| e.is_trading_day)
            .map(|e| e.day)
            .collect())
    }

    /// The first trading day strictly after `day`, scanning a bounded
    /// window forward. `None` when no trading day is known in the window.
    pub async fn next_trading_day(
        &self,
        exchange: Exchange,
        day: NaiveDate,
    ) -> Result<Option<NaiveDate>> {
        let horizon = day + Duration::days(TRADING_DAY_SCAN_LIMIT);
        let days = self
            .store
            .trading_days(exchange, day + Duration::days(1), horizon, true)?;
        Ok(days.into_iter().next())
    }

    /// The last trading day strictly before `day`, scanning a bounded
    /// window back.
    pub async fn previous_trading_day(
        &self,
        exchange: Exchange,
        day: NaiveDate,
    ) -> Result<Option<NaiveDate>> {
        let horizon = day - Duration::days(TRADING_DAY_SCAN_LIMIT);
        let days = self
            .store
            .trading_days(exchange, horizon, day - Duration::days(1), true)?;
        Ok(days.into_iter().next_back())
    }

    /// Drop the memo for an exchange after its calendar was rewritten.
    pub async fn invalidate(&self, exchange: Exchange) {
        debug!("Invalidating calendar memo for {}", exchange);
        self.memo.write().await.remove(&exchange);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradingCalendarEntry;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// In-memory calendar store for service tests.
    struct MemCalendar {
        rows: Mutex<BTreeMap<(Exchange, NaiveDate), bool>>,
    }

    impl MemCalendar {
        fn with_days(days: &[(u32, bool)]) -> Arc<Self> {
            let rows = days
                .iter()
                .map(|(d, open)| {
                    (
                        (Exchange::Sse, NaiveDate::from_ymd_opt(2024, 1, *d).unwrap()),
                        *open,
                    )
                })
                .collect();
            Arc::new(Self {
                rows: Mutex::new(rows),
            })
        }
    }

    #[async_trait]
    impl CalendarStore for MemCalendar {
        async fn upsert_calendar(&self, entries: &[TradingCalendarEntry]) -> Result<usize> {
            let mut rows = self.rows.lock().unwrap();
            for entry in entries {
                rows.insert((entry.exchange, entry.day), entry.is_trading_day);
            }
            Ok(entries.len())
        }

        fn trading_days(
            &self,
            exchange: Exchange,
            start: NaiveDate,
            end: NaiveDate,
            only_trading: bool,
        ) -> Result<Vec<NaiveDate>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|((ex, day), open)| {
                    *ex == exchange && *day >= start && *day <= end && (!only_trading || **open)
                })
                .map(|((_, day), _)| *day)
                .collect())
        }

        fn entries(
            &self,
            exchange: Exchange,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<TradingCalendarEntry>> {
            let now = Utc::now();
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|((ex, day), _)| *ex == exchange && *day >= start && *day <= end)
                .map(|((ex, day), open)| TradingCalendarEntry {
                    exchange: *ex,
                    day: *day,
                    is_trading_day: *open,
                    reason: None,
                    session_type: None,
                    source: None,
                    created_at: now,
                    updated_at: now,
                })
                .collect())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_trading_days_sorted_and_filtered() {
        let store = MemCalendar::with_days(&[(1, false), (2, true), (3, true), (6, false), (8, true)]);
        let service = CalendarService::new(store);

        let days = service
            .trading_days_in(Exchange::Sse, day(1), day(8))
            .await
            .unwrap();
        assert_eq!(days, vec![day(2), day(3), day(8)]);
    }

    #[tokio::test]
    async fn test_unknown_window_is_an_error() {
        let store = MemCalendar::with_days(&[(2, true)]);
        let service = CalendarService::new(store);

        let result = service
            .trading_days_in(Exchange::Sse, day(10), day(20))
            .await;
        assert!(matches!(result, Err(Error::CalendarUnknown { .. })));
    }

    #[tokio::test]
    async fn test_is_trading_day_memoizes() {
        let store = MemCalendar::with_days(&[(2, true), (6, false)]);
        let service = CalendarService::new(store);

        assert!(service.is_trading_day(Exchange::Sse, day(2)).await.unwrap());
        assert!(!service.is_trading_day(Exchange::Sse, day(6)).await.unwrap());
        // Unknown date still errors after memoization of others.
        assert!(service.is_trading_day(Exchange::Sse, day(9)).await.is_err());
    }

    #[tokio::test]
    async fn test_next_and_previous_trading_day() {
        let store = MemCalendar::with_days(&[(2, true), (3, true), (4, false), (5, true)]);
        let service = CalendarService::new(store);

        assert_eq!(
            service.next_trading_day(Exchange::Sse, day(3)).await.unwrap(),
            Some(day(5))
        );
        assert_eq!(
            service
                .previous_trading_day(Exchange::Sse, day(5))
                .await
                .unwrap(),
            Some(day(3))
        );
        assert_eq!(
            service
                .previous_trading_day(Exchange::Sse, day(2))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_invalidate_drops_memo() {
        let store = MemCalendar::with_days(&[(2, true)]);
        let service = CalendarService::new(store.clone());

        assert!(service.is_trading_day(Exchange::Sse, day(2)).await.unwrap());

        // Rewrite the underlying row and invalidate; the service must see
        // the new value.
        store
            .upsert_calendar(&[TradingCalendarEntry {
                exchange: Exchange::Sse,
                day: day(2),
                is_trading_day: false,
                reason: Some("holiday".to_string()),
                session_type: None,
                source: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }])
            .await
            .unwrap();
        service.invalidate(Exchange::Sse).await;

        assert!(!service.is_trading_day(Exchange::Sse, day(2)).await.unwrap());
    }
}
