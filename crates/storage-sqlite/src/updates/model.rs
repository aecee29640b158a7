//! Database model for data-update audit rows.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use quotehub_core::models::{DataUpdateRecord, DataUpdateStatus, UpdateKind};
use quotehub_core::{Exchange, Result};

use crate::errors::StorageError;
use crate::utils::{fmt_date, fmt_datetime, parse_date, parse_datetime};

#[derive(
    Queryable, Identifiable, Selectable, Insertable, AsChangeset, Debug, Clone, Serialize, Deserialize,
)]
#[diesel(table_name = crate::schema::data_updates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DataUpdateDB {
    pub id: String,
    pub batch_id: String,
    pub kind: String,
    pub exchange: String,
    pub start_date: String,
    pub end_date: String,
    pub total_instruments: i64,
    pub processed_instruments: i64,
    pub total_quotes: i64,
    pub status: String,
    pub progress: f64,
    pub error_message: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&DataUpdateRecord> for DataUpdateDB {
    fn from(record: &DataUpdateRecord) -> Self {
        DataUpdateDB {
            id: record.id.clone(),
            batch_id: record.batch_id.clone(),
            kind: record.kind.as_str().to_string(),
            exchange: record.exchange.code().to_string(),
            start_date: fmt_date(record.start_date),
            end_date: fmt_date(record.end_date),
            total_instruments: record.total_instruments,
            processed_instruments: record.processed_instruments,
            total_quotes: record.total_quotes,
            status: record.status.as_str().to_string(),
            progress: record.progress,
            error_message: record.error_message.clone(),
            started_at: fmt_datetime(record.started_at),
            completed_at: record.completed_at.map(fmt_datetime),
            created_at: fmt_datetime(record.created_at),
            updated_at: fmt_datetime(record.updated_at),
        }
    }
}

impl DataUpdateDB {
    pub fn into_domain(self) -> Result<DataUpdateRecord> {
        let exchange = Exchange::from_code(&self.exchange)
            .map_err(|e| StorageError::Conversion(format!("exchange {:?}: {}", self.exchange, e)))?;
        let start_date = parse_date(&self.start_date)
            .ok_or_else(|| StorageError::Conversion(format!("start_date {:?}", self.start_date)))?;
        let end_date = parse_date(&self.end_date)
            .ok_or_else(|| StorageError::Conversion(format!("end_date {:?}", self.end_date)))?;

        Ok(DataUpdateRecord {
            id: self.id,
            batch_id: self.batch_id,
            kind: UpdateKind::parse(&self.kind),
            exchange,
            start_date,
            end_date,
            total_instruments: self.total_instruments,
            processed_instruments: self.processed_instruments,
            total_quotes: self.total_quotes,
            status: DataUpdateStatus::parse(&self.status),
            progress: self.progress,
            error_message: self.error_message,
            started_at: parse_datetime(&self.started_at),
            completed_at: self.completed_at.as_deref().map(parse_datetime),
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}
