//! Provider-shaped row types.
//!
//! These are the only shapes an adapter is allowed to return. Conversion
//! from a provider's native payload happens once, inside the adapter;
//! conversion into the persisted domain model happens downstream in the
//! quality stage.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Exchange, InstrumentId};

/// One day's raw OHLCV bar as returned by a provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawDailyQuote {
    /// Civil trading date in the exchange session zone.
    pub day: NaiveDate,

    /// The instrument the bar belongs to.
    pub instrument_id: InstrumentId,

    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,

    /// Previous close, when the provider supplies one.
    pub pre_close: Option<Decimal>,

    /// Percent change, when the provider supplies one.
    pub pct_change: Option<Decimal>,

    /// Shares traded.
    pub volume: i64,

    /// Turnover amount in quote currency.
    pub amount: Option<Decimal>,

    /// Turnover rate, when available.
    pub turnover: Option<Decimal>,

    /// 1 = normal session, 0 = suspended.
    pub tradestatus: i32,

    /// Adjustment factor; 1 means unadjusted.
    pub factor: Decimal,

    /// Provider id the bar came from.
    pub source: String,
}

impl RawDailyQuote {
    /// A bare bar with only the required fields filled in.
    pub fn bar(
        day: NaiveDate,
        instrument_id: InstrumentId,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: i64,
        source: &str,
    ) -> Self {
        Self {
            day,
            instrument_id,
            open,
            high,
            low,
            close,
            pre_close: None,
            pct_change: None,
            volume,
            amount: None,
            turnover: None,
            tradestatus: 1,
            factor: Decimal::ONE,
            source: source.to_string(),
        }
    }
}

/// One instrument row from a provider's listing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInstrument {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub name: String,
    pub exchange: Exchange,
    /// Instrument kind as reported by the provider (STOCK, ETF, INDEX, ...).
    pub kind: String,
    pub currency: String,
    pub listed_date: Option<NaiveDate>,
    pub delisted_date: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,
    pub is_st: bool,
    /// 1 = trading normally, 0 = suspended.
    pub trading_status: i32,
    pub source: String,
    /// The symbol as the provider spells it.
    pub source_symbol: String,
}

/// One trading-calendar row from a provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalendarDay {
    pub exchange: Exchange,
    pub day: NaiveDate,
    pub is_trading_day: bool,
    pub reason: Option<String>,
}
