use std::{
    fs::{File, OpenOptions},
    path::Path,
    sync::Arc,
};

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Installs the global subscriber. Output goes to a file because the
/// terminal belongs to the UI while it runs.
pub fn init(config: &Config) -> Result<()> {
    let file = open_log_file(&config.log_path)?;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)
            .map_err(|err| anyhow::anyhow!("invalid log filter {}: {err}", config.log_filter))?,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Arc::new(file)),
        )
        .with(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("logger init failed: {err}"))?;
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| anyhow::anyhow!("cannot open log file {}: {err}", path.display()))?;
    Ok(file)
}
