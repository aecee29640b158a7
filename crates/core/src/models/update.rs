//! Audit rows for orchestrator runs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use quotehub_market_data::Exchange;

/// What kind of run produced a batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Full,
    Incremental,
    Repair,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Full => "full",
            UpdateKind::Incremental => "incremental",
            UpdateKind::Repair => "repair",
        }
    }

    pub fn parse(s: &str) -> UpdateKind {
        match s {
            "incremental" => UpdateKind::Incremental,
            "repair" => UpdateKind::Repair,
            _ => UpdateKind::Full,
        }
    }
}

/// Run lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataUpdateStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl DataUpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataUpdateStatus::Pending => "pending",
            DataUpdateStatus::Running => "running",
            DataUpdateStatus::Completed => "completed",
            DataUpdateStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> DataUpdateStatus {
        match s {
            "running" => DataUpdateStatus::Running,
            "completed" => DataUpdateStatus::Completed,
            "failed" => DataUpdateStatus::Failed,
            _ => DataUpdateStatus::Pending,
        }
    }
}

/// One audit row per `(batch, exchange)` of an orchestrator run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataUpdateRecord {
    /// `{batch_id}_{exchange}`.
    pub id: String,
    pub batch_id: String,
    pub kind: UpdateKind,
    pub exchange: Exchange,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    pub total_instruments: i64,
    pub processed_instruments: i64,
    pub total_quotes: i64,

    pub status: DataUpdateStatus,
    /// Fraction complete in [0, 1].
    pub progress: f64,
    pub error_message: Option<String>,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataUpdateRecord {
    pub fn begin(
        batch_id: &str,
        kind: UpdateKind,
        exchange: Exchange,
        start_date: NaiveDate,
        end_date: NaiveDate,
        total_instruments: i64,
    ) -> Self {
        let now = Utc::now();
        DataUpdateRecord {
            id: format!("{}_{}", batch_id, exchange.code()),
            batch_id: batch_id.to_string(),
            kind,
            exchange,
            start_date,
            end_date,
            total_instruments,
            processed_instruments: 0,
            total_quotes: 0,
            status: DataUpdateStatus::Running,
            progress: 0.0,
            error_message: None,
            started_at: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_progress(&mut self, processed: i64, quotes: i64) {
        self.processed_instruments = processed;
        self.total_quotes = quotes;
        self.progress = if self.total_instruments > 0 {
            (processed as f64 / self.total_instruments as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.updated_at = Utc::now();
    }

    pub fn finish(&mut self, status: DataUpdateStatus, error: Option<String>) {
        self.status = status;
        self.error_message = error;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        if status == DataUpdateStatus::Completed {
            self.progress = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let mut record =
            DataUpdateRecord::begin("20240106_010203", UpdateKind::Full, Exchange::Sse, start, end, 200);

        record.record_progress(50, 1_000);
        assert!((record.progress - 0.25).abs() < f64::EPSILON);

        record.finish(DataUpdateStatus::Completed, None);
        assert_eq!(record.status, DataUpdateStatus::Completed);
        assert!((record.progress - 1.0).abs() < f64::EPSILON);
        assert!(record.completed_at.is_some());
    }
}
