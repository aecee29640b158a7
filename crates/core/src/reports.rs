//! JSON report files.
//!
//! Every orchestrator run and scheduled job leaves a report under
//! `<data_dir>/reports`, named by batch id or date. Reports are plain
//! JSON with a `generated_at` ISO-8601 stamp; they are the operator's
//! audit surface, not an API.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::info;
use serde_json::json;

use crate::errors::{Error, Result};
use crate::gaps::Gap;
use crate::pipeline::DownloadProgress;
use crate::store::StoreStats;
use crate::time::session_now;

/// Writes the platform's JSON reports.
#[derive(Clone, Debug)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("reports"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `download_report_<batch_id>.json` — the run's final counters.
    pub async fn write_download_report(
        &self,
        progress: &DownloadProgress,
        stats: Option<&StoreStats>,
    ) -> Result<PathBuf> {
        let body = json!({
            "batch_id": progress.batch_id,
            "generated_at": session_now().to_rfc3339(),
            "summary": {
                "total_instruments": progress.total_instruments,
                "processed_instruments": progress.processed_instruments,
                "successful_downloads": progress.successful_downloads,
                "failed_downloads": progress.failed_downloads,
                "total_quotes": progress.total_quotes,
                "quality_issues": progress.quality_issues,
                "success_rate": progress.success_rate(),
                "quality_score": progress.data_quality_score(),
                "elapsed_seconds": progress.elapsed_seconds(),
            },
            "store": stats,
            "recent_errors": progress.errors,
        });

        self.write(format!("download_report_{}.json", progress.batch_id), &body)
            .await
    }

    /// `data_analysis_<batch_id>.json` — the post-run gap analysis.
    pub async fn write_analysis_report(
        &self,
        progress: &DownloadProgress,
        gaps: &[Gap],
    ) -> Result<PathBuf> {
        let mut by_severity: BTreeMap<&str, usize> = BTreeMap::new();
        let mut by_exchange: BTreeMap<String, usize> = BTreeMap::new();
        for gap in gaps {
            *by_severity.entry(gap.severity.as_str()).or_default() += 1;
            *by_exchange.entry(gap.exchange.code().to_string()).or_default() += 1;
        }

        let body = json!({
            "batch_id": progress.batch_id,
            "generated_at": session_now().to_rfc3339(),
            "download_progress": {
                "total_instruments": progress.total_instruments,
                "processed_instruments": progress.processed_instruments,
                "successful_downloads": progress.successful_downloads,
                "failed_downloads": progress.failed_downloads,
                "total_quotes": progress.total_quotes,
                "success_rate": progress.success_rate(),
                "quality_score": progress.data_quality_score(),
                "data_gaps_detected": gaps.len(),
            },
            "data_gaps": gaps,
            "gap_summary": {
                "total_gaps": gaps.len(),
                "by_severity": by_severity,
                "by_exchange": by_exchange,
            },
        });

        self.write(format!("data_analysis_{}.json", progress.batch_id), &body)
            .await
    }

    /// `daily_update_report_<YYYY-MM-DD>.json` — the incremental job.
    pub async fn write_daily_update_report(
        &self,
        target: NaiveDate,
        body: serde_json::Value,
    ) -> Result<PathBuf> {
        let mut body = body;
        if let Some(map) = body.as_object_mut() {
            map.insert(
                "generated_at".to_string(),
                json!(session_now().to_rfc3339()),
            );
        }
        self.write(
            format!("daily_update_report_{}.json", target.format("%Y-%m-%d")),
            &body,
        )
        .await
    }

    async fn write(&self, name: String, body: &serde_json::Value) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Report(format!("create {}: {}", self.dir.display(), e)))?;

        let path = self.dir.join(name);
        let payload = serde_json::to_vec_pretty(body)?;
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| Error::Report(format!("write {}: {}", path.display(), e)))?;

        info!("Report saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_download_report_written_with_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());

        let mut progress = DownloadProgress::new();
        progress.total_instruments = 4;
        progress.processed_instruments = 4;
        progress.successful_downloads = 4;
        progress.total_quotes = 16;

        let path = writer
            .write_download_report(&progress, None)
            .await
            .unwrap();
        assert!(path.ends_with(format!("download_report_{}.json", progress.batch_id)));

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(body["generated_at"].is_string());
        assert_eq!(body["summary"]["total_quotes"], 16);
    }

    #[tokio::test]
    async fn test_analysis_report_summarizes_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());
        let progress = DownloadProgress::new();

        let id = crate::InstrumentId::new("600000", crate::Exchange::Sse).unwrap();
        let gap = Gap {
            instrument_id: id,
            symbol: "600000".to_string(),
            exchange: crate::Exchange::Sse,
            first: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            last: NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            days: 2,
            gap_type: "missing_data".to_string(),
            severity: crate::gaps::GapSeverity::Medium,
            recommendation: "Schedule immediate fill".to_string(),
            missing_dates: vec![
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            ],
        };

        let path = writer
            .write_analysis_report(&progress, &[gap])
            .await
            .unwrap();
        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

        assert_eq!(body["gap_summary"]["total_gaps"], 1);
        assert_eq!(body["gap_summary"]["by_severity"]["medium"], 1);
        assert_eq!(body["gap_summary"]["by_exchange"]["SSE"], 1);
    }
}
