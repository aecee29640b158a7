//! The instrument master record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use quotehub_market_data::{Exchange, InstrumentId, ProviderInstrument};

/// Lifecycle status of an instrument.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl InstrumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentStatus::Active => "active",
            InstrumentStatus::Inactive => "inactive",
            InstrumentStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> InstrumentStatus {
        match s {
            "inactive" => InstrumentStatus::Inactive,
            "suspended" => InstrumentStatus::Suspended,
            _ => InstrumentStatus::Active,
        }
    }
}

/// A tradable instrument. Identity is `instrument_id`, which determines
/// `(symbol, exchange)`; the pair is unique across the store.
///
/// Created on first sighting from any provider and mutated by subsequent
/// refreshes; `data_version` counts the rewrites.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub instrument_id: InstrumentId,
    pub symbol: String,
    pub name: String,
    pub exchange: Exchange,
    /// STOCK, ETF, INDEX, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub currency: String,

    pub listed_date: Option<NaiveDate>,
    pub delisted_date: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,

    pub industry: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,

    pub status: InstrumentStatus,
    pub is_active: bool,
    pub is_st: bool,
    /// 1 = trading normally, 0 = suspended.
    pub trading_status: i32,

    pub source: Option<String>,
    pub source_symbol: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data_version: i32,
}

impl Instrument {
    /// First-sighting conversion from a provider listing row.
    pub fn from_provider(row: ProviderInstrument) -> Self {
        let now = Utc::now();
        let status = if row.trading_status == 1 {
            InstrumentStatus::Active
        } else {
            InstrumentStatus::Suspended
        };
        Instrument {
            instrument_id: row.instrument_id,
            symbol: row.symbol,
            name: row.name,
            exchange: row.exchange,
            kind: row.kind,
            currency: row.currency,
            listed_date: row.listed_date,
            delisted_date: row.delisted_date,
            issue_date: row.issue_date,
            industry: row.industry,
            sector: row.sector,
            market: row.market,
            status,
            is_active: row.delisted_date.is_none(),
            is_st: row.is_st,
            trading_status: row.trading_status,
            source: Some(row.source),
            source_symbol: Some(row.source_symbol),
            created_at: now,
            updated_at: now,
            data_version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            InstrumentStatus::Active,
            InstrumentStatus::Inactive,
            InstrumentStatus::Suspended,
        ] {
            assert_eq!(InstrumentStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_from_provider_first_sighting() {
        let id = InstrumentId::new("600000", Exchange::Sse).unwrap();
        let row = ProviderInstrument {
            instrument_id: id.clone(),
            symbol: "600000".to_string(),
            name: "浦发银行".to_string(),
            exchange: Exchange::Sse,
            kind: "STOCK".to_string(),
            currency: "CNY".to_string(),
            listed_date: NaiveDate::from_ymd_opt(1999, 11, 10),
            delisted_date: None,
            issue_date: None,
            industry: Some("银行".to_string()),
            sector: None,
            market: Some("主板".to_string()),
            is_st: false,
            trading_status: 1,
            source: "TUSHARE".to_string(),
            source_symbol: "600000.SH".to_string(),
        };

        let instrument = Instrument::from_provider(row);
        assert_eq!(instrument.instrument_id, id);
        assert_eq!(instrument.status, InstrumentStatus::Active);
        assert!(instrument.is_active);
        assert_eq!(instrument.data_version, 1);
    }
}
