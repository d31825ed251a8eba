//! Common utility functions for the command line driver.
//!
//! This module contains shared utilities including:
//! - Logger initialization
//! - Path validation for dataset directories and output files

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::LevelFilter;

/// Install the driver's logger.
///
/// Records are stamped with the local time, level and emitting module (`localization::filter`,
/// `pf_sim`, ...), so per-step filter diagnostics at `debug` can be told apart from driver messages. The
/// `RUST_LOG` environment variable, when set, refines the level per module on top of `level`.
///
/// Logs go to stderr unless `log_file` is given, in which case they are appended to that file and its
/// parent directory is created if needed.
pub fn init_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    use std::io::Write;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        builder.target(env_logger::Target::Pipe(Box::new(open_log_file(log_path)?)));
    }

    builder
        .try_init()
        .context("a logger is already installed")?;
    Ok(())
}

/// Open a log file for appending, creating the file and its parent directory as needed.
fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

/// Validate that a dataset directory exists and contains a landmark map.
pub fn validate_dataset_dir(input: &Path) -> Result<()> {
    if !input.is_dir() {
        bail!("Dataset path '{}' is not a directory.", input.display());
    }
    let map = input.join(localization::sim::MAP_FILE);
    if !map.is_file() {
        bail!(
            "Dataset directory '{}' has no {} file.",
            input.display(),
            localization::sim::MAP_FILE
        );
    }
    Ok(())
}

/// Make sure the parent directory of an output file exists, creating it if necessary.
pub fn validate_output_path(output: &Path) -> Result<()> {
    if output.is_dir() {
        bail!("Output path '{}' is a directory.", output.display());
    }
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
