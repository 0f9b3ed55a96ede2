//! Per-stage logging: console at INFO (or `RUST_LOG`), a stage log file
//! at DEBUG under `logs/{stage}_{YYYYMMDD_HHMMSS}.log`.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub fn init_stage_logging(stage: &str, logs_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(logs_dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_path = logs_dir.join(format!("{stage}_{timestamp}.log"));
    let log_file = std::fs::File::create(&log_path)?;

    let console_layer = tracing_subscriber::fmt::layer().with_target(false).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(stage, log = %log_path.display(), "stage logging initialized");
    Ok(())
}
