//! Logging setup
//!
//! Writes `tracing` output to `<BaseDir>/Logs/app.log`. The previous sessions'
//! logs are shifted to `app.log.1` .. `app.log.9` on every start.

use crate::error::{AisError, Result, StringError};
use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt};

/// Historical log files kept next to the current one
const MAX_LOG_FILES: u8 = 9;

/// Base name of the log file
const LOG_FILE_NAME: &str = "app.log";

/// Install the global subscriber writing to `logs_dir/app.log`
///
/// The level defaults to INFO and can be overridden through `RUST_LOG`.
pub fn init_logging(logs_dir: &Path) -> Result<()> {
    fs::create_dir_all(logs_dir)?;
    rotate_logs(&logs_dir.join(LOG_FILE_NAME))?;

    // Rotation happens once per session above, never by time
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix("app")
        .filename_suffix("log")
        .build(logs_dir)
        .map_err(|e| AisError::ConfigError(Box::new(e)))?;

    let subscriber = fmt()
        .with_writer(appender)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AisError::ConfigError(Box::new(e)))?;

    tracing::info!("TekDT AIS v{} started", env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Shift `app.log` -> `app.log.1` -> ... -> `app.log.9`, dropping the oldest
fn rotate_logs(log_path: &Path) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    let (Some(dir), Some(name)) = (log_path.parent(), log_path.file_name()) else {
        return Err(AisError::ConfigError(StringError::new(format!(
            "Invalid log path: {}",
            log_path.display()
        ))));
    };
    let name = name.to_string_lossy();
    let numbered = |i: u8| dir.join(format!("{name}.{i}"));

    let oldest = numbered(MAX_LOG_FILES);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..MAX_LOG_FILES).rev() {
        let from = numbered(i);
        if from.exists() {
            fs::rename(&from, numbered(i + 1))?;
        }
    }
    fs::rename(log_path, numbered(1))?;
    Ok(())
}
