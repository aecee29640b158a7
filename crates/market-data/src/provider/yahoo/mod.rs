//! Yahoo Finance data provider.
//!
//! Serves the overseas exchanges (HKEX, NASDAQ, NYSE) as primary and acts
//! as last-resort backup for the mainland exchanges, using the
//! `yahoo_finance_api` crate. Daily bars only; Yahoo offers neither a
//! usable exchange-wide listing nor a trading calendar.
//!
//! Symbol mapping happens at this boundary: `600000.SSE` becomes
//! `600000.SS`, `000001.SZSE` becomes `000001.SZ`, HKEX symbols are
//! zero-padded to four digits with a `.HK` suffix, and US symbols pass
//! through bare.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use log::{debug, warn};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use yahoo_finance_api as yahoo;

use crate::errors::MarketDataError;
use crate::models::{Exchange, InstrumentId, RawDailyQuote};
use crate::provider::{ProviderAdapter, ProviderCapabilities, RateLimit};

const PROVIDER_ID: &str = "YAHOO";

/// Yahoo Finance provider.
pub struct YahooAdapter {
    connector: yahoo::YahooConnector,
    rate_limit: RateLimit,
}

impl YahooAdapter {
    pub fn new(rate_limit: RateLimit) -> Result<Self, MarketDataError> {
        let connector =
            yahoo::YahooConnector::new().map_err(|e| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to initialize Yahoo connector: {}", e),
            })?;
        Ok(Self {
            connector,
            rate_limit,
        })
    }

    /// The ticker Yahoo expects for an instrument.
    fn yahoo_symbol(id: &InstrumentId) -> String {
        match id.exchange() {
            Exchange::Sse => format!("{}.SS", id.symbol()),
            Exchange::Szse | Exchange::Bse => format!("{}.SZ", id.symbol()),
            Exchange::Hkex => format!("{:0>4}.HK", id.symbol()),
            Exchange::Nasdaq | Exchange::Nyse => id.symbol().to_string(),
        }
    }

    fn day_bounds(start: NaiveDate, end: NaiveDate) -> (OffsetDateTime, OffsetDateTime) {
        let start_ts = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);
        let end_ts = end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(start_ts);
        (
            OffsetDateTime::from_unix_timestamp(start_ts)
                .unwrap_or_else(|_| OffsetDateTime::now_utc()),
            OffsetDateTime::from_unix_timestamp(end_ts)
                .unwrap_or_else(|_| OffsetDateTime::now_utc()),
        )
    }
}

#[async_trait]
impl ProviderAdapter for YahooAdapter {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            exchanges: &[
                Exchange::Sse,
                Exchange::Szse,
                Exchange::Hkex,
                Exchange::Nasdaq,
                Exchange::Nyse,
            ],
            supports_instrument_list: false,
            supports_daily: true,
            supports_calendar: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit.clone()
    }

    async fn fetch_daily(
        &self,
        instrument_id: &InstrumentId,
        _symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawDailyQuote>, MarketDataError> {
        let symbol = Self::yahoo_symbol(instrument_id);
        let (start_time, end_time) = Self::day_bounds(start, end);

        debug!(
            "Fetching {} ({}) from {} to {} from Yahoo",
            instrument_id, symbol, start, end
        );

        let response = self
            .connector
            .get_quote_history(&symbol, start_time, end_time)
            .await
            .map_err(|e| match e {
                yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult => {
                    MarketDataError::SymbolNotFound(symbol.clone())
                }
                other => MarketDataError::ProviderError {
                    provider: PROVIDER_ID.to_string(),
                    message: other.to_string(),
                },
            })?;

        let bars = match response.quotes() {
            Ok(bars) => bars,
            Err(yahoo::YahooError::NoQuotes) => return Ok(vec![]),
            Err(e) => {
                return Err(MarketDataError::ProviderError {
                    provider: PROVIDER_ID.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let mut quotes = Vec::with_capacity(bars.len());
        for bar in bars {
            let day = match DateTime::from_timestamp(bar.timestamp as i64, 0) {
                Some(ts) => ts.date_naive(),
                None => continue,
            };
            let (open, high, low, close) = match (
                Decimal::from_f64(bar.open),
                Decimal::from_f64(bar.high),
                Decimal::from_f64(bar.low),
                Decimal::from_f64(bar.close),
            ) {
                (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
                _ => {
                    warn!("Skipping Yahoo bar with non-finite prices for {}", symbol);
                    continue;
                }
            };

            quotes.push(RawDailyQuote::bar(
                day,
                instrument_id.clone(),
                open.round_dp(4),
                high.round_dp(4),
                low.round_dp(4),
                close.round_dp(4),
                bar.volume as i64,
                PROVIDER_ID,
            ));
        }

        quotes.sort_by_key(|q| q.day);
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yahoo_symbol_suffixes() {
        let sse = InstrumentId::new("600000", Exchange::Sse).unwrap();
        let szse = InstrumentId::new("000001", Exchange::Szse).unwrap();
        let hkex = InstrumentId::new("700", Exchange::Hkex).unwrap();
        let nasdaq = InstrumentId::new("AAPL", Exchange::Nasdaq).unwrap();

        assert_eq!(YahooAdapter::yahoo_symbol(&sse), "600000.SS");
        assert_eq!(YahooAdapter::yahoo_symbol(&szse), "000001.SZ");
        assert_eq!(YahooAdapter::yahoo_symbol(&hkex), "0700.HK");
        assert_eq!(YahooAdapter::yahoo_symbol(&nasdaq), "AAPL");
    }

    #[test]
    fn test_day_bounds_cover_whole_days() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let (s, e) = YahooAdapter::day_bounds(start, end);
        assert!(e.unix_timestamp() - s.unix_timestamp() >= 3 * 86_400);
    }
}
