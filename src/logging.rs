//! File logging. The TUI owns the terminal, so log lines go to rolling
//! files under `<data_dir>/logs` instead of stderr.

use anyhow::{Context, Result};
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use std::fs;
use std::path::Path;

const LOG_FILE_BASENAME: &str = "daybook";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

/// Starts the logger. The returned handle must stay alive for the whole
/// run; dropping it flushes and stops logging.
pub fn init(level: &str, data_dir: &Path) -> Result<LoggerHandle> {
    let dir = data_dir.join("logs");
    fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", dir))?;
    let handle = Logger::try_with_str(level)
        .with_context(|| format!("invalid log level `{level}`"))?
        .log_to_file(
            FileSpec::default()
                .directory(dir.clone())
                .basename(LOG_FILE_BASENAME)
                .suppress_timestamp(),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .append()
        .write_mode(WriteMode::BufferAndFlush)
        .start()
        .context("starting file logger")?;
    log::info!("logging to {}", dir.display());
    Ok(handle)
}
