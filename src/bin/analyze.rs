//! Chart computation for the airsight pipeline.
//!
//! Launched by the orchestrator once per run. Reads the readings file, writes
//! one chart per requested artifact into the output directory and prints a
//! single JSON report line on stdout.
//!
//! Usage:
//!   airsight-analyze data/air.csv static/images
//!   airsight-analyze data/air.csv static/images --start-date 2024-03-01 --end-date 2024-03-07
//!
//! Render and guideline parameters arrive as JSON in `AIRSIGHT_ANALYSIS_PARAMS`;
//! built-in defaults apply when it is unset. Logs go to stderr so stdout stays
//! machine-readable.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info};

use airsight::analysis::compute::{params_from_env, run_analysis};

#[derive(Parser)]
#[command(name = "airsight-analyze")]
#[command(about = "Render guideline-annotated air quality charts")]
struct Args {
    /// Readings CSV file.
    input: PathBuf,

    /// Directory receiving the chart artifacts.
    output_dir: PathBuf,

    /// First day to chart (YYYY-MM-DD, UTC). Overrides the parameters.
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last day to chart, inclusive. Overrides the parameters.
    #[arg(long)]
    end_date: Option<NaiveDate>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut params = params_from_env();
    if args.start_date.is_some() {
        params.window.start = args.start_date;
    }
    if args.end_date.is_some() {
        params.window.end = args.end_date;
    }
    info!(input = %args.input.display(), output = %args.output_dir.display(), "Analysis starting");

    let report = run_analysis(&args.input, &args.output_dir, &params);
    match serde_json::to_string(&report) {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "Cannot encode report"),
    }

    if report.success {
        ExitCode::SUCCESS
    } else {
        error!(error = report.error.as_deref().unwrap_or("unknown"), "Analysis failed");
        ExitCode::FAILURE
    }
}
