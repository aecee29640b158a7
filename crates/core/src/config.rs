//! Typed application configuration.
//!
//! One TOML document drives the whole platform. Every section has serde
//! defaults, so a missing file yields a working A-share deployment:
//! Tushare primary for the mainland exchanges, EastMoney as backup,
//! Yahoo for the overseas exchanges.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use quotehub_market_data::{Exchange, RateLimit, RoutingConfig, RoutingTable};

use crate::errors::{Error, Result};

/// Root configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub database: DatabaseConfig,
    /// Keyed by source name (`tushare`, `eastmoney`, `yahoo`).
    pub sources: BTreeMap<String, SourceConfig>,
    pub scheduler: SchedulerConfig,
    pub backup: BackupConfig,
    pub monitor: MonitorConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub batch_size: usize,
    /// Days per provider call; 0 fetches whole windows.
    pub download_chunk_days: i64,
    pub max_concurrent: usize,
    /// Named exchange groups selectable from the CLI.
    pub market_presets: BTreeMap<String, Vec<Exchange>>,
}

impl Default for DataConfig {
    fn default() -> Self {
        let mut market_presets = BTreeMap::new();
        market_presets.insert(
            "a_shares".to_string(),
            vec![Exchange::Sse, Exchange::Szse, Exchange::Bse],
        );
        market_presets.insert("hk_stocks".to_string(), vec![Exchange::Hkex]);
        market_presets.insert(
            "us_stocks".to_string(),
            vec![Exchange::Nasdaq, Exchange::Nyse],
        );
        market_presets.insert("global".to_string(), Exchange::ALL.to_vec());

        Self {
            data_dir: "data".to_string(),
            batch_size: 50,
            download_chunk_days: 0,
            max_concurrent: 3,
            market_presets,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_path: String,
    pub backup_enabled: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: "data/quotes.db".to_string(),
            backup_enabled: true,
        }
    }
}

/// One upstream source's settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub exchanges_supported: Vec<Exchange>,
    /// Exchanges this source is the primary for.
    pub primary_source_of: Vec<Exchange>,
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
    pub max_requests_per_day: u32,
    pub retry_times: u32,
    pub retry_interval_secs: f64,
    /// API token, for sources that need one.
    pub api_token: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exchanges_supported: Vec::new(),
            primary_source_of: Vec::new(),
            max_requests_per_minute: 30,
            max_requests_per_hour: 500,
            max_requests_per_day: 5_000,
            retry_times: 3,
            retry_interval_secs: 2.0,
            api_token: None,
        }
    }
}

impl SourceConfig {
    pub fn rate_limit(&self) -> RateLimit {
        RateLimit {
            per_minute: self.max_requests_per_minute,
            per_hour: self.max_requests_per_hour,
            per_day: self.max_requests_per_day,
            retries: self.retry_times,
            retry_backoff: Duration::from_secs_f64(self.retry_interval_secs.max(0.0)),
        }
    }
}

/// One scheduled job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Free-form parameters interpreted by the job.
    pub parameters: BTreeMap<String, toml::Value>,
    /// Whether the job writes a JSON report.
    pub report: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 24 * 3600,
            parameters: BTreeMap::new(),
            report: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub timezone: String,
    pub jobs: BTreeMap<String, JobConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let mut jobs = BTreeMap::new();
        jobs.insert(
            "daily_update".to_string(),
            JobConfig {
                enabled: true,
                interval_secs: 24 * 3600,
                ..JobConfig::default()
            },
        );
        jobs.insert(
            "calendar_update".to_string(),
            JobConfig {
                enabled: true,
                interval_secs: 7 * 24 * 3600,
                ..JobConfig::default()
            },
        );
        jobs.insert(
            "gap_repair".to_string(),
            JobConfig {
                enabled: true,
                interval_secs: 7 * 24 * 3600,
                ..JobConfig::default()
            },
        );
        jobs.insert(
            "database_backup".to_string(),
            JobConfig {
                enabled: true,
                interval_secs: 24 * 3600,
                ..JobConfig::default()
            },
        );
        jobs.insert(
            "health_check".to_string(),
            JobConfig {
                enabled: true,
                interval_secs: 3600,
                report: false,
                ..JobConfig::default()
            },
        );
        let mut retention = JobConfig {
            enabled: false,
            interval_secs: 90 * 24 * 3600,
            ..JobConfig::default()
        };
        retention
            .parameters
            .insert("days_to_keep".to_string(), toml::Value::Integer(3_650));
        jobs.insert("retention_cleanup".to_string(), retention);

        Self {
            enabled: true,
            timezone: "Asia/Shanghai".to_string(),
            jobs,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub backup_directory: String,
    pub retention_days: i64,
    pub max_backup_files: usize,
    pub compress: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_directory: "data/backups".to_string(),
            retention_days: 30,
            max_backup_files: 14,
            compress: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub max_history_size: usize,
    pub startup_delay_secs: u64,
    pub min_wait_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_history_size: 100,
            startup_delay_secs: 60,
            min_wait_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigIO(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&text).map_err(|e| Error::InvalidConfigValue(e.to_string()))
    }

    /// The default A-share deployment.
    pub fn a_share_default() -> AppConfig {
        let mut config = AppConfig::default();

        config.sources.insert(
            "tushare".to_string(),
            SourceConfig {
                enabled: true,
                exchanges_supported: vec![Exchange::Sse, Exchange::Szse, Exchange::Bse],
                primary_source_of: vec![Exchange::Sse, Exchange::Szse, Exchange::Bse],
                max_requests_per_minute: 300,
                max_requests_per_hour: 5_000,
                max_requests_per_day: 50_000,
                ..SourceConfig::default()
            },
        );
        config.sources.insert(
            "eastmoney".to_string(),
            SourceConfig {
                enabled: true,
                exchanges_supported: vec![Exchange::Sse, Exchange::Szse, Exchange::Bse],
                max_requests_per_minute: 60,
                ..SourceConfig::default()
            },
        );
        config.sources.insert(
            "yahoo".to_string(),
            SourceConfig {
                enabled: true,
                exchanges_supported: vec![
                    Exchange::Sse,
                    Exchange::Szse,
                    Exchange::Hkex,
                    Exchange::Nasdaq,
                    Exchange::Nyse,
                ],
                primary_source_of: vec![Exchange::Hkex, Exchange::Nasdaq, Exchange::Nyse],
                max_requests_per_minute: 60,
                max_requests_per_hour: 1_000,
                max_requests_per_day: 10_000,
                ..SourceConfig::default()
            },
        );

        config
    }

    /// Derive the registry routing tables: per exchange, the enabled
    /// source declaring itself primary, then every other enabled source
    /// supporting the exchange as backup (name order, deterministic).
    pub fn routing_config(&self) -> Result<RoutingConfig> {
        let mut routing = RoutingConfig::default();

        for exchange in Exchange::ALL {
            let primary = self.sources.iter().find(|(_, s)| {
                s.enabled && s.primary_source_of.contains(&exchange)
            });
            let Some((primary_name, _)) = primary else {
                continue;
            };

            let backups: Vec<&str> = self
                .sources
                .iter()
                .filter(|(name, s)| {
                    s.enabled
                        && *name != primary_name
                        && s.exchanges_supported.contains(&exchange)
                })
                .map(|(name, _)| name.as_str())
                .collect();

            let to_provider_id = |name: &str| name.to_ascii_uppercase();
            routing.set(
                exchange,
                RoutingTable {
                    primary: to_provider_id(primary_name),
                    backups: backups.iter().map(|b| to_provider_id(b)).collect(),
                },
            );
        }

        if routing.tables.is_empty() {
            return Err(Error::InvalidConfigValue(
                "no enabled source is primary for any exchange".into(),
            ));
        }
        Ok(routing)
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(name).filter(|s| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routing_tables() {
        let config = AppConfig::a_share_default();
        let routing = config.routing_config().unwrap();

        let sse = routing.table(Exchange::Sse).unwrap();
        assert_eq!(sse.primary, "TUSHARE");
        assert_eq!(sse.backups, vec!["EASTMONEY", "YAHOO"]);

        let nasdaq = routing.table(Exchange::Nasdaq).unwrap();
        assert_eq!(nasdaq.primary, "YAHOO");
        assert!(nasdaq.backups.is_empty());
    }

    #[test]
    fn test_disabled_source_excluded_from_routing() {
        let mut config = AppConfig::a_share_default();
        config.sources.get_mut("eastmoney").unwrap().enabled = false;

        let routing = config.routing_config().unwrap();
        let sse = routing.table(Exchange::Sse).unwrap();
        assert_eq!(sse.backups, vec!["YAHOO"]);
    }

    #[test]
    fn test_no_primaries_is_invalid() {
        let config = AppConfig::default();
        assert!(config.routing_config().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::a_share_default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sources.len(), 3);
        assert_eq!(parsed.data.batch_size, 50);
    }

    #[test]
    fn test_partial_document_gets_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [data]
            batch_size = 25
            "#,
        )
        .unwrap();
        assert_eq!(parsed.data.batch_size, 25);
        assert_eq!(parsed.data.download_chunk_days, 0);
        assert!(parsed.scheduler.enabled);
    }

    #[test]
    fn test_rate_limit_conversion() {
        let source = SourceConfig {
            max_requests_per_minute: 30,
            retry_times: 5,
            retry_interval_secs: 1.5,
            ..SourceConfig::default()
        };
        let limit = source.rate_limit();
        assert_eq!(limit.per_minute, 30);
        assert_eq!(limit.retries, 5);
        assert_eq!(limit.retry_backoff, Duration::from_millis(1_500));
    }
}
