//! airsight - air quality telemetry charts
//!
//! Turns a readings feed into guideline-annotated chart artifacts and serves
//! them to the dashboard.
//!
//! # Usage
//!
//! ```bash
//! # One pipeline run, prints the RunResult as JSON
//! airsight run
//!
//! # Chart only the first week of March
//! airsight run --start-date 2024-03-01 --end-date 2024-03-07
//!
//! # Write a week of synthetic readings
//! airsight sample --output data/air_quality_data.csv
//!
//! # Health self-check of artifacts, data and disk
//! airsight check
//!
//! # Dashboard surface plus periodic refresh (default)
//! airsight serve --addr 0.0.0.0:3000
//! ```
//!
//! # Environment Variables
//!
//! - `AIRSIGHT_CONFIG`: Path to the service config (default: ./airsight.toml)
//! - `AIRSIGHT_CHANNEL_ID`, `AIRSIGHT_READ_KEY`, `AIRSIGHT_WRITE_KEY`: channel credentials
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use airsight::analysis::{AnalysisOrchestrator, ArtifactVerifier, CommandLauncher, OrchestratorSettings};
use airsight::api::{create_app, DashboardState};
use airsight::background::{
    run_refresh_loop, ArtifactHealthCheck, DataFreshnessCheck, DiskHealthCheck, HealthCheck, HealthStatus,
    RefreshObserver, SelfHealer,
};
use airsight::config::{self, defaults, ReactiveConfigStore, ServiceConfig};
use airsight::guideline::GuidelineTable;
use airsight::render::RenderTargetFactory;
use airsight::sample::{CommandSampleGenerator, SampleGenerator, SyntheticSampleGenerator};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "airsight")]
#[command(about = "Guideline-annotated air quality charts")]
#[command(version)]
struct CliArgs {
    /// Service config file (overrides the search for ./airsight.toml)
    #[arg(long, global = true, env = "AIRSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the pipeline once and print the result as JSON
    Run {
        /// First UTC day to chart (overrides analysis.start_date)
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// Last UTC day to chart, inclusive (overrides analysis.end_date)
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// Write synthetic sample readings
    Sample {
        /// Output file (default: the configured data file)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Check artifacts, data freshness and disk space
    Check,
    /// Serve the dashboard API and refresh charts periodically
    Serve {
        /// Override the server address (default: "0.0.0.0:3000")
        #[arg(short, long)]
        addr: Option<String>,
    },
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ServiceConfig> {
    let mut cfg = match path {
        Some(path) => ServiceConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServiceConfig::load(),
    };
    if path.is_some() {
        cfg.apply_env_overrides();
    }
    Ok(cfg)
}

struct Pipeline {
    store: Arc<ReactiveConfigStore>,
    table: Arc<GuidelineTable>,
    orchestrator: Arc<AnalysisOrchestrator>,
}

async fn build_pipeline(cfg: &ServiceConfig) -> Result<Pipeline> {
    let table = Arc::new(GuidelineTable::who_2021().context("Built-in guideline table is malformed")?);

    let store = Arc::new(ReactiveConfigStore::new(
        config::build_authority(cfg),
        cfg.pipeline.clone(),
    ));
    if !store.init().await {
        warn!("Config authority unavailable, continuing with local pipeline settings");
    }

    let launcher = Arc::new(CommandLauncher::resolve(
        &cfg.analysis.command,
        cfg.analysis.args.clone(),
    ));
    let sample: Arc<dyn SampleGenerator> = match cfg
        .analysis
        .sample_command
        .as_deref()
        .and_then(|argv| CommandSampleGenerator::from_argv(argv, cfg.analysis.timeout()))
    {
        Some(command) => Arc::new(command),
        None => Arc::new(SyntheticSampleGenerator::default()),
    };
    info!(
        analysis = %launcher.program().display(),
        sample = sample.name(),
        output = %cfg.paths.output_dir.display(),
        "Pipeline assembled"
    );

    let orchestrator = AnalysisOrchestrator::new(
        OrchestratorSettings::from_config(cfg),
        table.clone(),
        RenderTargetFactory::new(&cfg.render),
        launcher,
        sample,
    )
    .with_config_store(store.clone());

    Ok(Pipeline {
        store,
        table,
        orchestrator: Arc::new(orchestrator),
    })
}

fn health_checks(cfg: &ServiceConfig, refresh: Option<Arc<Notify>>) -> Vec<Box<dyn HealthCheck>> {
    let verifier = ArtifactVerifier::new(cfg.paths.output_dir.clone(), cfg.analysis.artifacts.clone());
    let artifacts: Box<dyn HealthCheck> = Box::new(ArtifactHealthCheck::new(verifier, refresh));
    let data: Box<dyn HealthCheck> = Box::new(DataFreshnessCheck::new(
        cfg.paths.data_file.clone(),
        Duration::from_secs(defaults::DATA_STALE_AFTER_SECS),
    ));
    let disk: Box<dyn HealthCheck> = Box::new(DiskHealthCheck::new(
        cfg.paths.output_dir.clone(),
        defaults::MIN_FREE_DISK_BYTES,
    ));
    vec![artifacts, data, disk]
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_run(cfg: &ServiceConfig) -> Result<ExitCode> {
    let pipeline = build_pipeline(cfg).await?;

    let cancel_orchestrator = pipeline.orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling run...");
            cancel_orchestrator.cancel();
        }
    });

    let result = pipeline.orchestrator.run().await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_sample(cfg: &ServiceConfig, output: Option<PathBuf>) -> Result<ExitCode> {
    let path = output.unwrap_or_else(|| cfg.paths.data_file.clone());
    let rows = SyntheticSampleGenerator::default()
        .generate(&path, &cfg.pipeline)
        .await
        .with_context(|| format!("Failed to write sample data to {}", path.display()))?;
    println!("Wrote {} readings to {}", rows.unwrap_or_default(), path.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_check(cfg: &ServiceConfig) -> Result<ExitCode> {
    let healer = SelfHealer::new(health_checks(cfg, None));
    let health = healer.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(match health.overall {
        HealthStatus::Unhealthy { .. } => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

async fn cmd_serve(cfg: &ServiceConfig, addr: Option<String>) -> Result<ExitCode> {
    let server_addr = addr.unwrap_or_else(|| cfg.server.addr.clone());
    let pipeline = build_pipeline(cfg).await?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  airsight - air quality telemetry charts");
    info!("  data: {}", cfg.paths.data_file.display());
    info!("  charts: {}", cfg.paths.output_dir.display());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    let shutdown_orchestrator = pipeline.orchestrator.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_orchestrator.cancel();
        shutdown_token.cancel();
    });

    let mut tasks = JoinSet::new();

    if cfg.remote.config_url.is_none() {
        tasks.spawn(config::watcher::watch_config_file(
            cfg.remote.config_file.clone(),
            pipeline.store.clone(),
            cancel_token.clone(),
        ));
    }

    let refresh_trigger = Arc::new(Notify::new());
    let (observer, interval_rx) =
        RefreshObserver::channel(Duration::from_millis(pipeline.store.get().poll_interval_ms));
    pipeline.store.subscribe(observer);
    tasks.spawn(run_refresh_loop(
        pipeline.orchestrator.clone(),
        interval_rx,
        refresh_trigger.clone(),
        cancel_token.clone(),
    ));

    let healer = SelfHealer::new(health_checks(cfg, Some(refresh_trigger)));
    let health = healer.health_handle();
    tasks.spawn(healer.run(cancel_token.clone()));

    let state = DashboardState::new(pipeline.orchestrator.clone(), pipeline.store.clone(), pipeline.table.clone())
        .with_health(health);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {server_addr}"))?;
    info!(addr = %server_addr, "Dashboard API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let token = cancel_token.clone();
            async move { token.cancelled().await }
        })
        .await
        .context("Server error")?;

    cancel_token.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // .env first so credentials reach the config loader
    let dotenv = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_logging(args.log_json);
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let mut cfg = load_config(args.config.as_ref())?;
    if let Some(SubCommand::Run { start_date, end_date }) = &args.command {
        if start_date.is_some() {
            cfg.analysis.start_date = *start_date;
        }
        if end_date.is_some() {
            cfg.analysis.end_date = *end_date;
        }
        cfg.validate().context("Invalid date window")?;
    }
    config::init(cfg);
    let cfg = config::get();

    match args.command.unwrap_or(SubCommand::Serve { addr: None }) {
        SubCommand::Run { .. } => cmd_run(cfg).await,
        SubCommand::Sample { output } => cmd_sample(cfg, output).await,
        SubCommand::Check => cmd_check(cfg).await,
        SubCommand::Serve { addr } => cmd_serve(cfg, addr).await,
    }
}
