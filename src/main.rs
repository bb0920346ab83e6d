//! trawl: scan an entire table in parallel segments.
//!
//! Logs go to stderr so `--dump` output on stdout stays machine-readable.
//! Exits zero only when every segment was scanned to exhaustion.

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use trawl_config::{Overrides, RunConfig};
use trawl_scan::{ScanHandler, Scanner};
use trawl_store::backend::DynamoBackend;
use trawl_store::{Record, StoreHandle};

#[derive(Debug, Parser)]
#[command(name = "trawl", version, about = "Segmented parallel table scanner")]
struct Cli {
    /// Path to a TOML config file. Defaults to ./trawl.toml if present;
    /// `TRAWL_`-prefixed environment variables are merged on top.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Table to scan. Overrides the config file and environment.
    #[arg(long)]
    table: Option<String>,
    /// Segment count, which is also the scan concurrency. Overrides the
    /// config file and environment.
    #[arg(long)]
    segments: Option<usize>,
    /// Write every scanned record to stdout, one JSON object per line.
    #[arg(long)]
    dump: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides { table: cli.table.clone(), total_segments: cli.segments };
    let config = match RunConfig::load_with_overrides(cli.config.as_deref(), overrides) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration rejected");
            return ExitCode::FAILURE;
        },
    };

    let store: StoreHandle = Arc::new(
        DynamoBackend::connect("dynamodb", config.region.clone(), config.endpoint.clone()).await,
    );
    let mut scanner = Scanner::new(store, config.table.clone(), config.total_segments)
        .with_consistent_reads(config.consistent_read);
    if let Some(checkpoint) = &config.checkpoint {
        scanner = scanner.with_checkpoint(checkpoint.table.clone(), checkpoint.namespace.clone());
    }
    let cancel = CancellationToken::new();
    scanner = scanner.with_cancellation(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; draining workers");
            cancel.cancel();
        }
    });

    let handler: Arc<dyn ScanHandler> =
        if cli.dump { Arc::new(dump_records) } else { Arc::new(|_: Vec<Record>| {}) };
    let report = scanner.start(handler).wait().await;

    for failure in &report.failures {
        warn!(segment = failure.segment, error = %failure.error, "segment failed");
    }
    info!(
        items = report.metrics.items_processed,
        pages = report.metrics.pages_scanned,
        completed = report.completed_segments,
        cancelled = report.cancelled_segments,
        failed = report.failures.len(),
        "run finished"
    );
    if report.is_complete() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Handler for `--dump`: serialize each record as one JSON line. The lock
/// is held per page so records from concurrent segments never interleave
/// mid-line.
fn dump_records(records: Vec<Record>) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in records {
        match serde_json::to_string(&record) {
            Ok(line) => {
                if writeln!(out, "{line}").is_err() {
                    // Reader went away (e.g. `head`); nothing useful left
                    // to write.
                    return;
                }
            },
            Err(err) => warn!(error = %err, "record could not be serialized; skipped"),
        }
    }
}
