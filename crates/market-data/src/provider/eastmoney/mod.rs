//! EastMoney kline data provider.
//!
//! Keyless public endpoint serving daily klines for the mainland exchanges.
//! Each kline arrives as one comma-separated string:
//!
//! `date,open,close,high,low,volume,amount,amplitude,pct_chg,change,turnover`
//!
//! Backup-only source: daily bars, no listing, no calendar. Volume is
//! reported in lots of 100 shares and normalized here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use num_traits::ToPrimitive;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{Exchange, InstrumentId, RawDailyQuote};
use crate::provider::{ProviderAdapter, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const PROVIDER_ID: &str = "EASTMONEY";

/// Field list: date, OHLC, volume, amount, pct_chg, change, turnover.
const KLINE_FIELDS: &str = "f51,f52,f53,f54,f55,f56,f57,f59,f60,f61";

/// EastMoney kline provider.
pub struct EastMoneyAdapter {
    client: Client,
    rate_limit: RateLimit,
}

// ============================================================================
// Response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
    #[serde(rename = "rc")]
    return_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    klines: Vec<String>,
}

/// One decoded kline row, in the order of `KLINE_FIELDS`.
struct Kline {
    day: NaiveDate,
    open: Decimal,
    close: Decimal,
    high: Decimal,
    low: Decimal,
    volume: i64,
    amount: Option<Decimal>,
    pct_change: Option<Decimal>,
    turnover: Option<Decimal>,
}

impl Kline {
    fn parse(line: &str) -> Option<Kline> {
        let mut parts = line.split(',');
        let day = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
        let open: Decimal = parts.next()?.parse().ok()?;
        let close: Decimal = parts.next()?.parse().ok()?;
        let high: Decimal = parts.next()?.parse().ok()?;
        let low: Decimal = parts.next()?.parse().ok()?;
        // Lots of 100 shares.
        let volume = parts
            .next()?
            .parse::<Decimal>()
            .ok()
            .map(|v| v * Decimal::from(100))
            .and_then(|v| v.trunc().to_i64())?;
        let amount = parts.next().and_then(|s| s.parse().ok());
        let pct_change = parts.next().and_then(|s| s.parse().ok());
        let _change: Option<Decimal> = parts.next().and_then(|s| s.parse().ok());
        let turnover = parts.next().and_then(|s| s.parse().ok());

        Some(Kline {
            day,
            open,
            close,
            high,
            low,
            volume,
            amount,
            pct_change,
            turnover,
        })
    }
}

// ============================================================================
// Adapter implementation
// ============================================================================

impl EastMoneyAdapter {
    pub fn new(rate_limit: RateLimit) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, rate_limit }
    }

    /// EastMoney addresses instruments by `secid`: market prefix 1 for
    /// Shanghai, 0 for Shenzhen and Beijing, then the bare symbol.
    fn secid(id: &InstrumentId) -> String {
        let market = match id.exchange() {
            Exchange::Sse => "1",
            _ => "0",
        };
        format!("{}.{}", market, id.symbol())
    }
}

#[async_trait]
impl ProviderAdapter for EastMoneyAdapter {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            exchanges: &[Exchange::Sse, Exchange::Szse, Exchange::Bse],
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
        let begin = start.format("%Y%m%d").to_string();
        let finish = end.format("%Y%m%d").to_string();
        let secid = Self::secid(instrument_id);

        debug!(
            "EastMoney kline fetch: {} ({}) {}..{}",
            instrument_id, secid, begin, finish
        );

        let response: KlineResponse = self
            .client
            .get(BASE_URL)
            .query(&[
                ("secid", secid.as_str()),
                ("klt", "101"), // daily
                ("fqt", "0"),   // unadjusted
                ("fields1", "f1,f2,f3"),
                ("fields2", KLINE_FIELDS),
                ("beg", begin.as_str()),
                ("end", finish.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        let data = match response.data {
            Some(data) => data,
            None => {
                if response.return_code.unwrap_or(0) != 0 {
                    return Err(MarketDataError::ProviderError {
                        provider: PROVIDER_ID.to_string(),
                        message: format!("rc={}", response.return_code.unwrap_or(-1)),
                    });
                }
                return Ok(vec![]);
            }
        };

        let mut quotes = Vec::with_capacity(data.klines.len());
        for line in &data.klines {
            let kline = match Kline::parse(line) {
                Some(k) => k,
                None => {
                    warn!("Skipping unparsable EastMoney kline: {:?}", line);
                    continue;
                }
            };

            let mut quote = RawDailyQuote::bar(
                kline.day,
                instrument_id.clone(),
                kline.open,
                kline.high,
                kline.low,
                kline.close,
                kline.volume,
                PROVIDER_ID,
            );
            quote.amount = kline.amount;
            quote.pct_change = kline.pct_change;
            quote.turnover = kline.turnover;
            quotes.push(quote);
        }

        quotes.sort_by_key(|q| q.day);
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_secid_market_prefix() {
        let sse = InstrumentId::new("600000", Exchange::Sse).unwrap();
        let szse = InstrumentId::new("000001", Exchange::Szse).unwrap();
        assert_eq!(EastMoneyAdapter::secid(&sse), "1.600000");
        assert_eq!(EastMoneyAdapter::secid(&szse), "0.000001");
    }

    #[test]
    fn test_kline_parse() {
        let line = "2024-01-02,10.00,10.80,11.00,9.50,10000,10800000.0,14.02,0.00,0.00,1.25";
        let kline = Kline::parse(line).unwrap();
        assert_eq!(kline.day, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(kline.open, dec!(10.00));
        assert_eq!(kline.high, dec!(11.00));
        assert_eq!(kline.low, dec!(9.50));
        assert_eq!(kline.close, dec!(10.80));
        // 10000 lots = 1,000,000 shares
        assert_eq!(kline.volume, 1_000_000);
        assert_eq!(kline.amount, Some(dec!(10800000.0)));
        assert_eq!(kline.turnover, Some(dec!(1.25)));
    }

    #[test]
    fn test_kline_parse_rejects_garbage() {
        assert!(Kline::parse("not,a,kline").is_none());
        assert!(Kline::parse("").is_none());
    }
}
