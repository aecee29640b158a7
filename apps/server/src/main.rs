mod api;
mod config;
mod error;
mod scheduler;
mod state;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quotehub_core::gaps::{GapFillFilter, GapSeverity};
use quotehub_core::pipeline::DownloadSpec;
use quotehub_core::time::session_today;
use quotehub_core::Exchange;

use config::ServerConfig;
use state::build_state;

#[derive(Parser)]
#[command(name = "quotehub", about = "Market-quote data platform", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server with the background scheduler.
    Serve {
        /// Listen address; overrides QUOTEHUB_LISTEN.
        #[arg(long)]
        listen: Option<String>,
        /// Disable the scheduler for this process.
        #[arg(long)]
        no_scheduler: bool,
    },
    /// Download historical data for one or more exchanges.
    Download {
        /// Exchange codes (SSE, SZSE, BSE, HKEX, NASDAQ, NYSE).
        #[arg(long, value_delimiter = ',')]
        exchanges: Vec<String>,
        /// A market preset from the configuration.
        #[arg(long)]
        preset: Option<String>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Reset progress instead of resuming.
        #[arg(long)]
        no_resume: bool,
    },
    /// Incremental update for a single trading day.
    Update {
        #[arg(long, value_delimiter = ',')]
        exchanges: Vec<String>,
        /// Target date; defaults to today in the session zone.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Detect data gaps.
    Gaps {
        #[arg(long, value_delimiter = ',')]
        exchanges: Vec<String>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Filter to one severity (low|medium|high|critical).
        #[arg(long)]
        severity: Option<String>,
    },
    /// Repair data gaps.
    Fill {
        #[arg(long, value_delimiter = ',')]
        exchanges: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        severities: Vec<String>,
        #[arg(long)]
        max_gap_days: Option<i64>,
        /// Report what would be filled without fetching.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print store statistics.
    Status,
    /// Back up the database file.
    Backup,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn resolve_exchanges(
    config: &quotehub_core::config::AppConfig,
    codes: &[String],
    preset: Option<&String>,
) -> anyhow::Result<Vec<Exchange>> {
    if let Some(preset) = preset {
        return config
            .data
            .market_presets
            .get(preset)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown preset {:?}", preset));
    }
    if codes.is_empty() {
        let routing = config.routing_config()?;
        return Ok(routing.tables.keys().copied().collect());
    }
    codes
        .iter()
        .map(|c| Exchange::from_code(c).map_err(|e| anyhow::anyhow!(e.to_string())))
        .collect()
}

fn parse_severity(s: &str) -> anyhow::Result<GapSeverity> {
    match s {
        "low" => Ok(GapSeverity::Low),
        "medium" => Ok(GapSeverity::Medium),
        "high" => Ok(GapSeverity::High),
        "critical" => Ok(GapSeverity::Critical),
        other => anyhow::bail!("unknown severity {:?}", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = ServerConfig::from_env()?;

    match cli.command {
        Command::Serve { listen, no_scheduler } => {
            let state = build_state(config.app.clone())?;

            if !no_scheduler {
                scheduler::start(state.clone());
            }

            let listen_addr = listen.unwrap_or(config.listen_addr);
            let router = api::app_router(state);
            tracing::info!("Listening on {}", listen_addr);
            let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
            axum::serve(listener, router).await?;
        }

        Command::Download {
            exchanges,
            preset,
            start_date,
            end_date,
            no_resume,
        } => {
            let state = build_state(config.app.clone())?;
            let exchanges = resolve_exchanges(&state.config, &exchanges, preset.as_ref())?;

            let outcome = state
                .orchestrator
                .run(DownloadSpec {
                    exchanges,
                    start: start_date,
                    end: end_date,
                    quality_threshold: None,
                    resume: !no_resume,
                    force_update_calendar: None,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Command::Update { exchanges, date } => {
            let state = build_state(config.app.clone())?;
            let exchanges = resolve_exchanges(&state.config, &exchanges, None)?;
            let body = state.orchestrator.run_daily_update(exchanges, date).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Command::Gaps {
            exchanges,
            start_date,
            end_date,
            severity,
        } => {
            let state = build_state(config.app.clone())?;
            let exchanges = resolve_exchanges(&state.config, &exchanges, None)?;
            let end = end_date.unwrap_or_else(session_today);

            let mut gaps = state.gap_engine.detect(&exchanges, start_date, end).await?;
            if let Some(severity) = severity.as_deref() {
                let severity = parse_severity(severity)?;
                gaps.retain(|g| g.severity == severity);
            }
            println!("{}", serde_json::to_string_pretty(&gaps)?);
        }

        Command::Fill {
            exchanges,
            severities,
            max_gap_days,
            dry_run,
        } => {
            let state = build_state(config.app.clone())?;
            let exchanges = resolve_exchanges(&state.config, &exchanges, None)?;
            let severities = severities
                .iter()
                .map(|s| parse_severity(s))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let outcome = state
                .gap_engine
                .fill(&GapFillFilter {
                    exchanges: Some(exchanges),
                    severities: (!severities.is_empty()).then_some(severities),
                    max_days: max_gap_days,
                    dry_run,
                    ..GapFillFilter::default()
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Command::Status => {
            let state = build_state(config.app.clone())?;
            let stats = state.maintenance.snapshot_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Backup => {
            let state = build_state(config.app.clone())?;
            let backup = &state.config.backup;
            let path = state
                .maintenance
                .backup(std::path::Path::new(&backup.backup_directory), backup.compress)
                .await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
