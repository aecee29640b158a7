//! Database model for instruments.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use quotehub_core::models::{Instrument, InstrumentStatus};
use quotehub_core::{Exchange, InstrumentId, Result};

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
#[diesel(table_name = crate::schema::instruments)]
#[diesel(primary_key(instrument_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InstrumentDB {
    pub instrument_id: String,
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub kind: String,
    pub currency: String,
    pub listed_date: Option<String>,
    pub delisted_date: Option<String>,
    pub issue_date: Option<String>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub market: Option<String>,
    pub status: String,
    pub is_active: bool,
    pub is_st: bool,
    pub trading_status: i32,
    pub source: Option<String>,
    pub source_symbol: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub data_version: i32,
}

impl From<&Instrument> for InstrumentDB {
    fn from(instrument: &Instrument) -> Self {
        InstrumentDB {
            instrument_id: instrument.instrument_id.canonical(),
            symbol: instrument.symbol.clone(),
            name: instrument.name.clone(),
            exchange: instrument.exchange.code().to_string(),
            kind: instrument.kind.clone(),
            currency: instrument.currency.clone(),
            listed_date: instrument.listed_date.map(fmt_date),
            delisted_date: instrument.delisted_date.map(fmt_date),
            issue_date: instrument.issue_date.map(fmt_date),
            industry: instrument.industry.clone(),
            sector: instrument.sector.clone(),
            market: instrument.market.clone(),
            status: instrument.status.as_str().to_string(),
            is_active: instrument.is_active,
            is_st: instrument.is_st,
            trading_status: instrument.trading_status,
            source: instrument.source.clone(),
            source_symbol: instrument.source_symbol.clone(),
            created_at: fmt_datetime(instrument.created_at),
            updated_at: fmt_datetime(instrument.updated_at),
            data_version: instrument.data_version,
        }
    }
}

impl InstrumentDB {
    /// Fallible because the stored id must parse; a row that does not is
    /// corrupt and surfaces as an internal error.
    pub fn into_domain(self) -> Result<Instrument> {
        let instrument_id = InstrumentId::parse_any(&self.instrument_id).map_err(|e| {
            StorageError::Conversion(format!("instrument id {:?}: {}", self.instrument_id, e))
        })?;
        let exchange = Exchange::from_code(&self.exchange)
            .map_err(|e| StorageError::Conversion(format!("exchange {:?}: {}", self.exchange, e)))?;

        Ok(Instrument {
            instrument_id,
            symbol: self.symbol,
            name: self.name,
            exchange,
            kind: self.kind,
            currency: self.currency,
            listed_date: self.listed_date.as_deref().and_then(parse_date),
            delisted_date: self.delisted_date.as_deref().and_then(parse_date),
            issue_date: self.issue_date.as_deref().and_then(parse_date),
            industry: self.industry,
            sector: self.sector,
            market: self.market,
            status: InstrumentStatus::parse(&self.status),
            is_active: self.is_active,
            is_st: self.is_st,
            trading_status: self.trading_status,
            source: self.source,
            source_symbol: self.source_symbol,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
            data_version: self.data_version,
        })
    }
}
