//! Error types for `TekDT AIS`
//!
//! Two layers exist: [`AisError`] covers startup, configuration, catalog and
//! tool provisioning, while [`TaskError`] describes why a single worker task
//! ended without success. Task errors never cross the worker boundary as
//! errors; they are turned into progress events.

use std::time::Duration;
use thiserror::Error;

/// Plain message usable as the boxed source of an [`AisError`]
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StringError(pub String);

impl StringError {
    /// Boxed error carrying `msg`
    pub fn new(msg: impl Into<String>) -> Box<Self> {
        Box::new(Self(msg.into()))
    }
}

/// Main error type for `TekDT AIS`
#[derive(Debug, Error)]
pub enum AisError {
    /// Configuration error
    /// Preserves the underlying error source for full error chain transparency
    #[error("Configuration error: {0}")]
    ConfigError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Network request failed (catalog, icon or release metadata)
    #[error("Network error: {0}")]
    NetworkError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Downloading or unpacking an external tool failed
    #[error("Tool provisioning failed: {0}")]
    ToolProvisioningError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A required external tool is absent and could not be obtained
    #[error("Required tool missing: {0}")]
    ToolMissing(String),

    /// The app key is not present in the catalog
    #[error("Unknown application: {0}")]
    UnknownApp(String),

    /// Command-line argument could not be parsed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The task worker failed outside of any single task
    #[error("Worker error: {0}")]
    WorkerError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Zip archive could not be read
    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    /// Icon image could not be decoded or encoded
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}

/// Result type alias for `TekDT AIS` operations
pub type Result<T> = std::result::Result<T, AisError>;

/// Reason a single task did not reach the success state
#[derive(Debug, Error)]
pub enum TaskError {
    /// Downloader exited with a non-zero status
    #[error("Download failed (exit code {code:?}): {stderr}")]
    DownloadFailed {
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Captured standard error of the downloader
        stderr: String,
    },

    /// Installer exited with a non-zero status
    #[error("Installation failed. Exit code: {code:?}")]
    InstallFailed {
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
    },

    /// Installer did not exit within the allowed time and was terminated
    #[error("Installation timed out after {0:?}")]
    InstallTimedOut(Duration),

    /// 7-Zip could not unpack a portable archive
    #[error("Extraction failed. Exit code: {code:?}")]
    ExtractFailed {
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
    },

    /// A subprocess could not be started
    #[error("Failed to start {program}: {source}")]
    SpawnFailed {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The task was cancelled by a stop request
    #[error("Stopped by user")]
    Stopped,

    /// File system error while preparing or finishing the task
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A task thread panicked
    #[error("Unexpected error: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Whether this error represents cancellation rather than failure
    pub fn is_stopped(&self) -> bool {
        matches!(self, TaskError::Stopped)
    }
}

/// Convert an error to a user-friendly message
///
/// This function takes an `AisError` and returns a message suitable
/// for displaying to end users in error dialogs.
pub fn get_user_friendly_error(error: &AisError) -> String {
    match error {
        AisError::ConfigError(_) => "Failed to load or save configuration.\n\n\
             Your selections may not persist.\n\
             Check that you have write permissions to the application folder."
            .to_string(),
        AisError::NetworkError(e) => {
            format!(
                "A network request failed:\n\n{e}\n\n\
                 The application will continue with locally known software."
            )
        }
        AisError::ToolProvisioningError(e) => {
            format!(
                "Failed to update the bundled tools:\n\n{e}\n\n\
                 Existing tools will be used if they are present."
            )
        }
        AisError::ToolMissing(tool) => {
            format!(
                "Required tool is missing: {tool}\n\n\
                 Connect to the Internet and restart the application\n\
                 so the tool can be downloaded."
            )
        }
        AisError::UnknownApp(key) => {
            format!(
                "Unknown application: {key}\n\n\
                 The application is not in the catalog or not compatible with this system."
            )
        }
        AisError::InvalidArgument(arg) => {
            format!(
                "Invalid command-line argument: {arg}\n\n\
                 Run with /help to see the supported options."
            )
        }
        AisError::WorkerError(message) => {
            format!(
                "The background task stopped unexpectedly:\n\n{message}\n\n\
                 Try starting the operation again."
            )
        }
        AisError::IoError(e) => {
            format!(
                "A file system error occurred:\n\n{e}\n\n\
                 Please check file permissions and disk space."
            )
        }
        AisError::JsonError(e) => {
            format!(
                "Configuration file is corrupted:\n\n{e}\n\n\
                 The application will use default settings."
            )
        }
        AisError::ArchiveError(e) => {
            format!(
                "A downloaded archive could not be unpacked:\n\n{e}\n\n\
                 The download may be incomplete. Try again later."
            )
        }
        AisError::ImageError(e) => {
            format!(
                "An icon could not be processed:\n\n{e}\n\n\
                 A placeholder icon will be used. This does not affect functionality."
            )
        }
    }
}
