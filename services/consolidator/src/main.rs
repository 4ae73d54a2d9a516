//! Consolidator CLI - Builds the district statistics table from a directory
//! of downloaded snapshots
//!
//! Usage:
//!   # Defaults (./madrid_historical_data -> madrid_datos_actuaciones_policiales.csv):
//!   cargo run --bin consolidator
//!
//!   # Custom taxonomy and a run report:
//!   cargo run --bin consolidator -- --config config/taxonomy.json --report run.json
//!
//!   # Validate a batch without writing anything:
//!   cargo run --bin consolidator -- --input-dir ./snapshots --dry-run

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use consolidator::config::{DEFAULT_ANCHOR, DEFAULT_STEP_DAYS};
use consolidator::output::write_report;
use consolidator::{
    consolidate, CsvTableWriter, DirectoryProvider, PeriodSettings, RunContext, SnapshotProvider,
    TableConsumer, TaxonomyConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "consolidator",
    about = "Consolidates monthly district police statistics into one table"
)]
struct Args {
    /// Directory holding the snapshot workbooks
    #[arg(long, env = "SNAPSHOT_DIR", default_value = "./madrid_historical_data")]
    input_dir: PathBuf,

    /// CSV output path
    #[arg(
        long,
        env = "OUTPUT_CSV",
        default_value = "madrid_datos_actuaciones_policiales.csv"
    )]
    output: PathBuf,

    /// Optional JSON run report path
    #[arg(long, env = "RUN_REPORT")]
    report: Option<PathBuf>,

    /// Period assigned to the highest ordinal (YYYY-MM-DD)
    #[arg(long, env = "PERIOD_ANCHOR", default_value_t = DEFAULT_ANCHOR)]
    anchor: NaiveDate,

    /// Days between consecutive ranks
    #[arg(long, env = "PERIOD_STEP_DAYS", default_value_t = DEFAULT_STEP_DAYS)]
    step_days: i64,

    /// JSON file overriding the sheet taxonomy and canonical rules
    #[arg(long, env = "CONSOLIDATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Extraction workers (0 = one per core)
    #[arg(long, env = "CONSOLIDATOR_JOBS", default_value_t = 0)]
    jobs: usize,

    /// Dry run - consolidate but write nothing
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,consolidator=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_context(args: &Args) -> Result<RunContext> {
    let taxonomy = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading taxonomy config");
            TaxonomyConfig::load(path)?
        }
        None => TaxonomyConfig::default(),
    };
    let periods = PeriodSettings {
        anchor: args.anchor,
        step_days: args.step_days,
    };
    let ctx = RunContext::new(taxonomy, periods).context("Invalid configuration")?;
    Ok(ctx.with_jobs(args.jobs))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    println!("=== District Statistics Consolidator ===");
    println!("Input: {}", args.input_dir.display());
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let ctx = build_context(&args)?;

    let provider = DirectoryProvider::new(&args.input_dir);
    let batch = provider.fetch_batch().await?;
    if batch.is_empty() {
        warn!(dir = %provider.dir().display(), "no snapshot workbooks found");
    }

    // Extraction is CPU bound; keep it off the async workers.
    let worker_ctx = ctx.clone();
    let outcome = tokio::task::spawn_blocking(move || consolidate(batch, &worker_ctx))
        .await
        .context("Consolidation task panicked")?;

    if let Some(path) = &args.report {
        if args.dry_run {
            info!(path = %path.display(), "dry run - report not written");
        } else {
            write_report(&outcome.report, path)?;
        }
    }

    if outcome.store.is_empty() {
        anyhow::bail!(
            "BatchEmptyResult: no snapshot in {} yielded district data ({} skipped)",
            args.input_dir.display(),
            outcome.report.skipped.len()
        );
    }

    let snapshots = outcome.report.snapshots.len();
    let skipped = outcome.report.skipped.len();
    let sheet_failures = outcome.report.sheet_failure_count();
    let table = outcome.store.finalize();

    if args.dry_run {
        println!("\nDry run - table not written");
    } else {
        CsvTableWriter::new(&args.output).consume(&table)?;
    }

    println!("\n=== Consolidation Complete ===");
    println!("Run ID: {}", outcome.report.run_id);
    println!("Snapshots: {} processed, {} skipped", snapshots, skipped);
    println!("Sheets skipped: {}", sheet_failures);
    println!("Rows: {}", table.rows.len());
    if let Some((first, last)) = table.period_range() {
        println!("Range: {} - {}", first, last);
    }
    println!("Districts: {}", table.district_count());
    println!("Indicator columns: {}", table.columns.len());
    if !args.dry_run {
        println!("Output: {}", args.output.display());
    }

    Ok(())
}
