mod observer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxtract_core::{
    cleanup, load_config, validate_config, verify, Config, FfmpegEncoder, IdleReason,
    PipelineController, PipelineOptions, RunOutcome, ShutdownRequest, SqliteLedger,
};

use observer::ConsoleObserver;

/// Batch speech-audio extraction from video libraries
#[derive(Parser, Debug)]
#[command(name = "voxtract")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input root directory to scan
    #[arg(short, long)]
    input: PathBuf,

    /// Recurse into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Concurrent conversions, clamped to [1, 25]
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Concurrent directory scanners, clamped to [1, 20]
    #[arg(short, long)]
    scanners: Option<usize>,

    /// Scan and classify only; convert nothing
    #[arg(short, long)]
    dry_run: bool,

    /// Forward the encoder diagnostic stream to the log
    #[arg(short, long)]
    verbose: bool,

    /// Report interrupted and failed ledger records, then exit
    #[arg(long)]
    verify: bool,

    /// Delete targets of interrupted/failed records and drop the records;
    /// combine with --dry-run to preview
    #[arg(long)]
    cleanup: bool,

    /// Path to a voxtract.toml configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = load_configuration(args.config.as_deref())?;
    validate_config(&config).context("configuration validation failed")?;

    if args.verify {
        return run_verify(&args.input);
    }
    if args.cleanup {
        return run_cleanup(&args.input, args.dry_run);
    }

    let options = PipelineOptions {
        input_root: args.input.clone(),
        recursive: args.recursive || config.pipeline.recursive,
        concurrency: args
            .concurrency
            .unwrap_or(config.pipeline.concurrency)
            .clamp(1, 25),
        scanners: args
            .scanners
            .unwrap_or(config.pipeline.scanners)
            .clamp(1, 20),
        dry_run: args.dry_run,
        verbose: args.verbose,
        encoder: config.encoder.clone(),
    };

    let encoder = Arc::new(
        FfmpegEncoder::new(options.encoder.clone()).with_verbose(options.verbose),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(2);
    spawn_signal_handler(shutdown_tx);

    let controller = PipelineController::new(options, encoder)
        .with_observer(Arc::new(ConsoleObserver));
    let outcome = controller.run(shutdown_rx).await?;

    report_outcome(&args.input, &outcome);
    Ok(())
}

fn load_configuration(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let default_path = Path::new("voxtract.toml");
            if default_path.exists() {
                load_config(default_path).context("failed to load voxtract.toml")
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// First interrupt drains, second aborts. A stuck pipeline is force-exited
/// shortly after the second.
fn spawn_signal_handler(tx: tokio::sync::broadcast::Sender<ShutdownRequest>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("interrupt: finishing running conversions, press Ctrl-C again to abort");
        let _ = tx.send(ShutdownRequest::Graceful);

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("interrupt: aborting");
        let _ = tx.send(ShutdownRequest::Immediate);

        tokio::time::sleep(Duration::from_secs(10)).await;
        error!("pipeline did not wind down; exiting");
        std::process::exit(1);
    });
}

fn run_verify(input_root: &Path) -> Result<()> {
    let ledger = SqliteLedger::open(input_root).context("failed to open ledger")?;
    let report = verify(&ledger)?;

    if report.is_clean() {
        println!("Ledger is clean: no interrupted or failed conversions.");
        return Ok(());
    }

    println!("{} interrupted conversion(s):", report.processing.len());
    for entry in &report.processing {
        println!(
            "  {} -> {} (started {}){}",
            entry.record.source_path.display(),
            entry.record.target_path.display(),
            entry.record.started_at.format("%Y-%m-%d %H:%M:%S"),
            if entry.target_exists {
                ", partial output on disk"
            } else {
                ""
            }
        );
    }

    println!("{} failed conversion(s):", report.failed.len());
    for entry in &report.failed {
        println!(
            "  {} ({})",
            entry.record.source_path.display(),
            entry.record.error.as_deref().unwrap_or("unknown error"),
        );
    }

    Ok(())
}

fn run_cleanup(input_root: &Path, dry_run: bool) -> Result<()> {
    let ledger = SqliteLedger::open(input_root).context("failed to open ledger")?;
    let outcome = cleanup(&ledger, dry_run)?;

    if dry_run {
        println!("Would remove {} ledger record(s):", outcome.entries.len());
        for entry in &outcome.entries {
            println!(
                "  {}{}",
                entry.record.source_path.display(),
                if entry.target_exists {
                    " (would delete target)"
                } else {
                    ""
                }
            );
        }
    } else {
        println!(
            "Removed {} ledger record(s), deleted {} stray target(s).",
            outcome.removed_records,
            outcome.deleted_targets.len()
        );
    }

    Ok(())
}

fn report_outcome(input_root: &Path, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::DryRun { stats, idle } => {
            println!("Dry run over {}:", input_root.display());
            println!("  {} video file(s) found", stats.total_found);
            println!("  {} to convert", stats.to_process);
            println!("  {} skipped (audio exists)", stats.skipped_audio);
            println!("  {} skipped (transcript exists)", stats.skipped_subtitle);
            if stats.errors > 0 {
                println!("  {} unreadable path(s)", stats.errors);
            }
            report_idle(*idle);
        }
        RunOutcome::Completed {
            stats,
            summary,
            idle,
        } => {
            println!(
                "Converted {} file(s), {} failed, {} cancelled in {:.1}s ({} bytes written).",
                summary.completed,
                summary.failed,
                summary.cancelled,
                summary.elapsed_ms as f64 / 1000.0,
                summary.total_output_bytes,
            );
            if stats.errors > 0 {
                println!("{} path(s) could not be read during the scan.", stats.errors);
            }
            report_idle(*idle);
        }
    }
}

fn report_idle(idle: Option<IdleReason>) {
    match idle {
        Some(IdleReason::NoCandidates) => {
            println!("Nothing to do: no video files found.");
        }
        Some(IdleReason::AllHaveCompanions) => {
            println!("Nothing to do: all candidates already have companion audio or transcripts.");
        }
        None => {}
    }
}
