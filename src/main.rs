//! Wave Batcher - dry-run planner for operation batches
//!
//! Reads a JSON array of operations, validates and plans it, runs it through
//! the simulated submitter, and prints the full report as JSON.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use tracing::{error, info};

use wave_batcher::{BatchEngine, BatchOperation, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Wave Batcher v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration (cycle policy {:?}, gas price {} wei)",
        settings.planner.cycle_policy, settings.pricing.gas_price_wei
    );

    let batch_path = env::args()
        .nth(1)
        .context("usage: wave-batcher <batch.json>")?;
    let raw = fs::read_to_string(&batch_path)
        .with_context(|| format!("Failed to read batch file: {}", batch_path))?;
    let operations: Vec<BatchOperation> =
        serde_json::from_str(&raw).with_context(|| "Failed to parse batch file")?;
    info!("Loaded {} operations from {}", operations.len(), batch_path);

    let engine = BatchEngine::new(&settings);
    let report = match engine.dry_run(&operations).await {
        Ok(report) => report,
        Err(e) => {
            error!("Batch rejected: {}", e);
            return Err(e.into());
        }
    };

    println!("{}", report.to_json_pretty()?);
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wave_batcher=debug"));

    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .init();
}
