//! aria2c download wrapper

use crate::error::TaskError;
use crate::worker::process::{ProcessExit, configure_hidden_process, supervise};
use regex::Regex;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::info;

/// Matches aria2c summary lines such as `[#2089b0 4.0MiB/33MiB(12%) CN:16 DL:2.1MiB]`
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[.*?\((\d+)%\)").unwrap_or_else(|e| unreachable!("invalid progress regex: {e}"))
});

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// Destination directory
    pub dir: PathBuf,
    /// Destination file name
    pub file_name: String,
    /// Optional `Referer` header
    pub referer: Option<String>,
}

impl DownloadRequest {
    /// Full destination path
    pub fn target(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Fetches a file to disk
///
/// `progress` receives percentages in 0..=100. Implementations must return
/// [`TaskError::Stopped`] promptly once `stop` is set.
pub trait Downloader: Send + Sync {
    /// Download `request`, blocking until done
    fn download(
        &self,
        request: &DownloadRequest,
        stop: &AtomicBool,
        progress: &dyn Fn(u8),
    ) -> Result<(), TaskError>;
}

/// [`Downloader`] running the bundled aria2c
#[derive(Debug, Clone)]
pub struct Aria2Downloader {
    /// Path to `aria2c.exe`
    executable: PathBuf,
    /// Interval at which the stop flag is polled
    poll_interval: Duration,
}

impl Aria2Downloader {
    /// Downloader using the aria2c binary at `executable`
    pub fn new(executable: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            executable: executable.into(),
            poll_interval,
        }
    }
}

impl Downloader for Aria2Downloader {
    fn download(
        &self,
        request: &DownloadRequest,
        stop: &AtomicBool,
        progress: &dyn Fn(u8),
    ) -> Result<(), TaskError> {
        std::fs::create_dir_all(&request.dir)?;
        info!("Downloading {} to {}", request.url, request.target().display());

        let mut command = Command::new(&self.executable);
        command.args(build_args(request));
        configure_hidden_process(&mut command);

        let mut last_percent = None;
        let exit = supervise(
            &mut command,
            &self.executable,
            stop,
            None,
            self.poll_interval,
            &mut |line| {
                if let Some(percent) = parse_progress_percent(line)
                    && last_percent != Some(percent)
                {
                    last_percent = Some(percent);
                    progress(percent);
                }
            },
        )?;

        match exit {
            ProcessExit::Exited { code: Some(0), .. } => Ok(()),
            ProcessExit::Exited { code, stderr } => Err(TaskError::DownloadFailed { code, stderr }),
            ProcessExit::Stopped => Err(TaskError::Stopped),
            ProcessExit::TimedOut(_) => Err(TaskError::DownloadFailed {
                code: None,
                stderr: "download timed out".to_string(),
            }),
        }
    }
}

/// aria2c arguments for `request`
pub fn build_args(request: &DownloadRequest) -> Vec<String> {
    let mut args = vec![
        "--dir".to_string(),
        request.dir.display().to_string(),
        "--out".to_string(),
        request.file_name.clone(),
        "--max-connection-per-server=16".to_string(),
        "--split=16".to_string(),
        "--min-split-size=1M".to_string(),
        "--continue=true".to_string(),
        "--auto-file-renaming=false".to_string(),
        "--show-console-readout=false".to_string(),
        "--summary-interval=1".to_string(),
    ];
    if let Some(referer) = request.referer.as_deref().filter(|r| !r.is_empty()) {
        args.push("--header".to_string());
        args.push(format!("Referer: {referer}"));
    }
    args.push(request.url.clone());
    args
}

/// Extract the percentage from an aria2c summary line
pub fn parse_progress_percent(line: &str) -> Option<u8> {
    let caps = PROGRESS_RE.captures(line)?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    u8::try_from(value.min(100)).ok()
}
