//! Background scheduler.
//!
//! Interval-driven jobs configured through `scheduler_config`. Each job
//! checks its enabled flag at construction, waits out the startup delay,
//! then ticks forever; failures are logged and the next tick proceeds.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use quotehub_core::config::JobConfig;
use quotehub_core::gaps::{GapFillFilter, GapSeverity};
use quotehub_core::time::{session_today, session_yesterday};
use quotehub_core::Exchange;

use crate::state::AppState;

/// Start every enabled job. Returns immediately; jobs run on the runtime.
pub fn start(state: Arc<AppState>) {
    if !state.config.scheduler.enabled {
        info!("Scheduler disabled by configuration");
        return;
    }

    let startup_delay = Duration::from_secs(state.config.monitor.startup_delay_secs);
    let jobs = state.config.scheduler.jobs.clone();

    for (name, job) in jobs {
        if !job.enabled {
            continue;
        }
        spawn_job(state.clone(), name, job, startup_delay);
    }
}

fn spawn_job(state: Arc<AppState>, name: String, job: JobConfig, startup_delay: Duration) {
    tokio::spawn(async move {
        info!(
            "Scheduler job '{}' started (every {}s)",
            name, job.interval_secs
        );
        tokio::time::sleep(startup_delay).await;

        let mut ticker = interval(Duration::from_secs(job.interval_secs.max(60)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = run_job(&state, &name).await {
                error!("Scheduled job '{}' failed: {}", name, e);
            }
        }
    });
}

fn routed_exchanges(state: &AppState) -> Vec<Exchange> {
    state
        .config
        .routing_config()
        .map(|r| r.tables.keys().copied().collect())
        .unwrap_or_else(|_| vec![Exchange::Sse, Exchange::Szse])
}

async fn run_job(state: &Arc<AppState>, name: &str) -> anyhow::Result<()> {
    match name {
        "daily_update" => {
            if state.orchestrator.is_running() {
                warn!("Skipping daily update: a download is already running");
                return Ok(());
            }
            let body = state
                .orchestrator
                .run_daily_update(routed_exchanges(state), None)
                .await?;
            info!("Daily update finished: {}", body["target_date"]);
        }

        "calendar_update" => {
            // A year ahead keeps the planner off the unknown-window path.
            let start = session_today() - ChronoDuration::days(30);
            let end = session_today() + ChronoDuration::days(370);
            for exchange in routed_exchanges(state) {
                match state
                    .market_data
                    .update_trading_calendar(exchange, start, end)
                    .await
                {
                    Ok(rows) => info!("Calendar refresh {}: {} rows", exchange, rows),
                    Err(e) => warn!("Calendar refresh {} failed: {}", exchange, e),
                }
            }
        }

        "gap_repair" => {
            if state.orchestrator.is_running() {
                warn!("Skipping gap repair: a download is already running");
                return Ok(());
            }
            let filter = GapFillFilter {
                exchanges: Some(routed_exchanges(state)),
                severities: Some(vec![GapSeverity::Medium, GapSeverity::High]),
                end: Some(session_yesterday()),
                ..GapFillFilter::default()
            };
            let outcome = state.gap_engine.fill(&filter).await?;
            info!(
                "Gap repair finished: {} found, {} filled, {} failed",
                outcome.found, outcome.filled, outcome.failed
            );
        }

        "database_backup" => {
            if !state.config.database.backup_enabled {
                return Ok(());
            }
            let backup = &state.config.backup;
            let dir = std::path::Path::new(&backup.backup_directory);
            let path = state.maintenance.backup(dir, backup.compress).await?;
            info!("Backup written: {}", path.display());
            quotehub_storage_sqlite::prune_backups(
                dir,
                backup.retention_days,
                backup.max_backup_files,
            )?;
            state.maintenance.analyze().await?;
        }

        "health_check" => {
            let providers = state.market_data.health_check_all().await;
            let unhealthy: Vec<&String> = providers
                .iter()
                .filter(|(_, ok)| !**ok)
                .map(|(name, _)| name)
                .collect();
            if unhealthy.is_empty() {
                info!("Health check: all {} providers healthy", providers.len());
            } else {
                warn!("Health check: unhealthy providers: {:?}", unhealthy);
            }

            let findings = state.maintenance.integrity_check()?;
            if !findings.is_empty() {
                error!("Database integrity findings: {:?}", findings);
            }
        }

        "retention_cleanup" => {
            let days_to_keep = state
                .config
                .scheduler
                .jobs
                .get(name)
                .and_then(|job| job.parameters.get("days_to_keep"))
                .and_then(|v| v.as_integer())
                .unwrap_or(3_650);
            let cutoff = session_today() - ChronoDuration::days(days_to_keep);
            let removed = state.quotes.delete_before(cutoff).await?;
            info!(
                "Retention cleanup removed {} quotes older than {}",
                removed, cutoff
            );
            state.maintenance.vacuum().await?;
        }

        other => warn!("Unknown scheduler job '{}', ignoring", other),
    }

    Ok(())
}
