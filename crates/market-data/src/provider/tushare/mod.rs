//! Tushare Pro data provider.
//!
//! Tushare exposes a single JSON-over-POST endpoint; every call names an
//! `api_name` and gets back a tabular payload of `fields` + `items` that is
//! decoded positionally. Calls are authenticated with a per-account token.
//!
//! Capabilities: instrument listing (`stock_basic`), daily bars (`daily`)
//! and the trading calendar (`trade_cal`) for the mainland exchanges.
//!
//! Unit notes: `daily` reports volume in lots of 100 shares and amount in
//! thousands of CNY; both are normalized here at the boundary.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use num_traits::ToPrimitive;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::MarketDataError;
use crate::models::{CalendarDay, Exchange, InstrumentId, ProviderInstrument, RawDailyQuote};
use crate::provider::{ProviderAdapter, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://api.tushare.pro";
const PROVIDER_ID: &str = "TUSHARE";

const DAILY_FIELDS: &str = "ts_code,trade_date,open,high,low,close,pre_close,pct_chg,vol,amount";
const BASIC_FIELDS: &str = "ts_code,symbol,name,industry,market,list_date,delist_date,list_status";
const CAL_FIELDS: &str = "cal_date,is_open";

/// Tushare Pro provider.
pub struct TushareAdapter {
    client: Client,
    token: String,
    rate_limit: RateLimit,
}

// ============================================================================
// Response structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i64,
    msg: Option<String>,
    data: Option<TushareData>,
}

#[derive(Debug, Deserialize)]
struct TushareData {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

/// Positional accessor over one tabular payload.
struct FieldMap(HashMap<String, usize>);

impl FieldMap {
    fn new(fields: &[String]) -> Self {
        Self(
            fields
                .iter()
                .enumerate()
                .map(|(i, f)| (f.clone(), i))
                .collect(),
        )
    }

    fn str<'a>(&self, row: &'a [Value], field: &str) -> Option<&'a str> {
        self.0.get(field).and_then(|&i| row.get(i)?.as_str())
    }

    fn decimal(&self, row: &[Value], field: &str) -> Option<Decimal> {
        let value = self.0.get(field).and_then(|&i| row.get(i))?;
        match value {
            Value::Number(n) => Decimal::try_from(n.as_f64()?).ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn date(&self, row: &[Value], field: &str) -> Option<NaiveDate> {
        self.str(row, field)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
    }
}

// ============================================================================
// Adapter implementation
// ============================================================================

impl TushareAdapter {
    pub fn new(token: String, rate_limit: RateLimit) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            token,
            rate_limit,
        }
    }

    /// The symbol suffix Tushare expects for an exchange.
    fn ts_suffix(exchange: Exchange) -> &'static str {
        match exchange {
            Exchange::Sse => "SH",
            Exchange::Szse => "SZ",
            Exchange::Bse => "BJ",
            other => other.code(),
        }
    }

    fn ts_code(id: &InstrumentId) -> String {
        format!("{}.{}", id.symbol(), Self::ts_suffix(id.exchange()))
    }

    /// Issue one API call and unwrap the tabular payload.
    async fn call(&self, api_name: &str, params: Value, fields: &str) -> Result<TushareData, MarketDataError> {
        let body = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": fields,
        });

        debug!("Tushare call: {} {}", api_name, params);

        let response: TushareResponse = self
            .client
            .post(BASE_URL)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            let message = response.msg.unwrap_or_else(|| "unknown error".to_string());
            // Tushare signals quota exhaustion through the message text.
            if message.contains("每分钟") || message.contains("访问频率") {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message,
            });
        }

        response.data.ok_or_else(|| MarketDataError::ProviderError {
            provider: PROVIDER_ID.to_string(),
            message: "response carried no data".to_string(),
        })
    }

    fn format_day(day: NaiveDate) -> String {
        day.format("%Y%m%d").to_string()
    }
}

#[async_trait]
impl ProviderAdapter for TushareAdapter {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            exchanges: &[Exchange::Sse, Exchange::Szse, Exchange::Bse],
            supports_instrument_list: true,
            supports_daily: true,
            supports_calendar: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit.clone()
    }

    async fn list_instruments(
        &self,
        exchange: Exchange,
    ) -> Result<Vec<ProviderInstrument>, MarketDataError> {
        let data = self
            .call(
                "stock_basic",
                json!({ "exchange": exchange.code(), "list_status": "L" }),
                BASIC_FIELDS,
            )
            .await?;

        let map = FieldMap::new(&data.fields);
        let mut instruments = Vec::with_capacity(data.items.len());

        for row in &data.items {
            let symbol = match map.str(row, "symbol") {
                Some(s) => s.to_string(),
                None => continue,
            };
            let instrument_id = match InstrumentId::new(&symbol, exchange) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping unparsable Tushare symbol {:?}: {}", symbol, e);
                    continue;
                }
            };

            let name = map.str(row, "name").unwrap_or_default().to_string();
            let delisted = map.str(row, "list_status") == Some("D");

            instruments.push(ProviderInstrument {
                instrument_id,
                symbol: symbol.clone(),
                name: name.clone(),
                exchange,
                kind: "STOCK".to_string(),
                currency: "CNY".to_string(),
                listed_date: map.date(row, "list_date"),
                delisted_date: map.date(row, "delist_date"),
                issue_date: None,
                industry: map.str(row, "industry").map(str::to_string),
                sector: None,
                market: map.str(row, "market").map(str::to_string),
                is_st: name.contains("ST"),
                trading_status: if delisted { 0 } else { 1 },
                source: PROVIDER_ID.to_string(),
                source_symbol: map.str(row, "ts_code").unwrap_or(&symbol).to_string(),
            });
        }

        Ok(instruments)
    }

    async fn fetch_daily(
        &self,
        instrument_id: &InstrumentId,
        _symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawDailyQuote>, MarketDataError> {
        let data = self
            .call(
                "daily",
                json!({
                    "ts_code": Self::ts_code(instrument_id),
                    "start_date": Self::format_day(start),
                    "end_date": Self::format_day(end),
                }),
                DAILY_FIELDS,
            )
            .await?;

        let map = FieldMap::new(&data.fields);
        let mut quotes = Vec::with_capacity(data.items.len());

        for row in &data.items {
            let day = match map.date(row, "trade_date") {
                Some(d) => d,
                None => continue,
            };
            let (open, high, low, close) = match (
                map.decimal(row, "open"),
                map.decimal(row, "high"),
                map.decimal(row, "low"),
                map.decimal(row, "close"),
            ) {
                (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
                _ => {
                    warn!(
                        "Skipping Tushare row with missing prices for {} on {}",
                        instrument_id, day
                    );
                    continue;
                }
            };

            // vol is in lots of 100 shares, amount in thousands of CNY.
            let volume = map
                .decimal(row, "vol")
                .map(|v| v * Decimal::from(100))
                .and_then(|v| v.trunc().to_i64())
                .unwrap_or(0);
            let amount = map.decimal(row, "amount").map(|a| a * Decimal::from(1000));

            let mut quote = RawDailyQuote::bar(
                day,
                instrument_id.clone(),
                open,
                high,
                low,
                close,
                volume,
                PROVIDER_ID,
            );
            quote.pre_close = map.decimal(row, "pre_close");
            quote.pct_change = map.decimal(row, "pct_chg");
            quote.amount = amount;
            quotes.push(quote);
        }

        // Tushare returns newest-first; downstream expects chronological.
        quotes.sort_by_key(|q| q.day);
        Ok(quotes)
    }

    async fn fetch_calendar(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarDay>, MarketDataError> {
        let data = self
            .call(
                "trade_cal",
                json!({
                    "exchange": exchange.code(),
                    "start_date": Self::format_day(start),
                    "end_date": Self::format_day(end),
                }),
                CAL_FIELDS,
            )
            .await?;

        let map = FieldMap::new(&data.fields);
        let mut days: Vec<CalendarDay> = data
            .items
            .iter()
            .filter_map(|row| {
                let day = map.date(row, "cal_date")?;
                let is_open = map
                    .decimal(row, "is_open")
                    .map(|v| v == Decimal::ONE)
                    .unwrap_or(false);
                Some(CalendarDay {
                    exchange,
                    day,
                    is_trading_day: is_open,
                    reason: None,
                })
            })
            .collect();

        days.sort_by_key(|d| d.day);
        Ok(days)
    }

    async fn health_check(&self) -> Result<(), MarketDataError> {
        // A one-row calendar probe is the cheapest authenticated call.
        let today = chrono::Utc::now().date_naive();
        self.call(
            "trade_cal",
            json!({
                "exchange": "SSE",
                "start_date": Self::format_day(today),
                "end_date": Self::format_day(today),
            }),
            CAL_FIELDS,
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_code_uses_native_suffixes() {
        let sse = InstrumentId::new("600000", Exchange::Sse).unwrap();
        let szse = InstrumentId::new("000001", Exchange::Szse).unwrap();
        let bse = InstrumentId::new("832000", Exchange::Bse).unwrap();
        assert_eq!(TushareAdapter::ts_code(&sse), "600000.SH");
        assert_eq!(TushareAdapter::ts_code(&szse), "000001.SZ");
        assert_eq!(TushareAdapter::ts_code(&bse), "832000.BJ");
    }

    #[test]
    fn test_field_map_positional_decode() {
        let fields = vec![
            "trade_date".to_string(),
            "close".to_string(),
            "vol".to_string(),
        ];
        let map = FieldMap::new(&fields);
        let row = vec![
            Value::String("20240102".to_string()),
            serde_json::json!(10.8),
            serde_json::json!(10000),
        ];

        assert_eq!(
            map.date(&row, "trade_date"),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(map.decimal(&row, "close"), Decimal::try_from(10.8).ok());
        assert!(map.decimal(&row, "missing").is_none());
    }
}
