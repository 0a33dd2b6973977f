//! Subprocess supervision
//!
//! Every external program (aria2c, installers, 7zr) runs under the same
//! loop: output is read on helper threads and delivered over a channel, and
//! the child is polled with `try_wait` so a stop request or a timeout can
//! kill it promptly.

use crate::error::TaskError;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Windows `CREATE_NO_WINDOW` process creation flag
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Lines of stderr kept for error messages
const STDERR_TAIL_LINES: usize = 20;

/// Hide the console window of a child process on Windows
pub fn configure_hidden_process(command: &mut Command) -> &mut Command {
    #[cfg(windows)]
    {
        command.creation_flags(CREATE_NO_WINDOW);
    }
    command
}

/// How a supervised process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own
    Exited {
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Last lines written to stderr
        stderr: String,
    },
    /// Killed after a stop request
    Stopped,
    /// Killed after running longer than allowed
    TimedOut(Duration),
}

impl ProcessExit {
    /// Whether the process exited with code 0
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessExit::Exited { code: Some(0), .. })
    }
}

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run
    pub program: PathBuf,
    /// Arguments, passed without shell interpretation
    pub args: Vec<String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Maximum run time
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Invocation of `program` with `args`
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout: None,
        }
    }

    /// Set the working directory
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the maximum run time
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        configure_hidden_process(&mut command);
        command
    }
}

/// Runs installers and extractors to completion
///
/// Implementations must return [`ProcessExit::Stopped`] promptly once
/// `stop` is set.
pub trait ProcessRunner: Send + Sync {
    /// Run `invocation` until it exits, is stopped, or times out
    fn run(&self, invocation: &Invocation, stop: &AtomicBool) -> Result<ProcessExit, TaskError>;
}

/// [`ProcessRunner`] backed by real child processes
#[derive(Debug, Clone, Copy)]
pub struct SystemProcessRunner {
    /// Interval at which the stop flag and the child are polled
    poll_interval: Duration,
}

impl SystemProcessRunner {
    /// Runner polling every `poll_interval`
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, invocation: &Invocation, stop: &AtomicBool) -> Result<ProcessExit, TaskError> {
        info!(
            "Running {} {}",
            invocation.program.display(),
            invocation.args.join(" ")
        );
        let mut command = invocation.command();
        supervise(
            &mut command,
            &invocation.program,
            stop,
            invocation.timeout,
            self.poll_interval,
            &mut |_| {},
        )
    }
}

enum OutputLine {
    Stdout(String),
    Stderr(String),
}

fn forward_lines<R: Read + Send + 'static>(
    reader: R,
    tx: mpsc::Sender<OutputLine>,
    wrap: fn(String) -> OutputLine,
) {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines().map_while(std::result::Result::ok) {
            if tx.send(wrap(line)).is_err() {
                break;
            }
        }
    });
}

/// Spawn `command` and supervise it
///
/// Each stdout line is passed to `on_stdout`. The last stderr lines are kept
/// for the exit report.
pub fn supervise(
    command: &mut Command,
    program: &Path,
    stop: &AtomicBool,
    timeout: Option<Duration>,
    poll_interval: Duration,
    on_stdout: &mut dyn FnMut(&str),
) -> Result<ProcessExit, TaskError> {
    if stop.load(Ordering::SeqCst) {
        return Ok(ProcessExit::Stopped);
    }

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| TaskError::SpawnFailed {
            program: program.display().to_string(),
            source,
        })?;

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone(), OutputLine::Stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx, OutputLine::Stderr);
    }

    let started = Instant::now();
    let mut stderr_tail: Vec<String> = Vec::new();
    let mut handle_line = |line: OutputLine, stderr_tail: &mut Vec<String>| match line {
        OutputLine::Stdout(line) => on_stdout(&line),
        OutputLine::Stderr(line) => {
            debug!("stderr: {}", line);
            stderr_tail.push(line);
            if stderr_tail.len() > STDERR_TAIL_LINES {
                stderr_tail.remove(0);
            }
        }
    };

    loop {
        match rx.recv_timeout(poll_interval) {
            Ok(line) => handle_line(line, &mut stderr_tail),
            Err(RecvTimeoutError::Timeout) => {}
            // Both pipes closed; keep polling the child at the normal pace
            Err(RecvTimeoutError::Disconnected) => thread::sleep(poll_interval),
        }

        if stop.load(Ordering::SeqCst) {
            info!("Stop requested, terminating {}", program.display());
            terminate(&mut child);
            return Ok(ProcessExit::Stopped);
        }

        if let Some(limit) = timeout
            && started.elapsed() >= limit
        {
            warn!("{} exceeded {:?}, terminating", program.display(), limit);
            terminate(&mut child);
            return Ok(ProcessExit::TimedOut(limit));
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                // Pick up output written just before exit
                while let Ok(line) = rx.recv_timeout(poll_interval) {
                    handle_line(line, &mut stderr_tail);
                }
                debug!("{} exited with {:?}", program.display(), status.code());
                return Ok(ProcessExit::Exited {
                    code: status.code(),
                    stderr: stderr_tail.join("\n"),
                });
            }
            Ok(None) => {}
            Err(e) => {
                terminate(&mut child);
                return Err(TaskError::Io(e));
            }
        }
    }
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Kill failed, process may have exited already: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap terminated process: {}", e);
    }
}

/// Split an installer parameter string into arguments
///
/// Whitespace separates arguments and double quotes group them. Backslashes
/// are literal so Windows paths survive unchanged.
pub fn split_install_params(params: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in params.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Arguments for `7zr x -y -o<dest> <archive>`
pub fn extract_args(archive: &Path, dest: &Path) -> Vec<String> {
    vec![
        "x".to_string(),
        "-y".to_string(),
        format!("-o{}", dest.display()),
        archive.display().to_string(),
    ]
}

/// Whether `path` names an archive handled by 7-Zip
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "zip" | "7z" | "rar"))
}

/// Start a portable app without waiting for it
pub fn launch_portable(executable: &Path) -> std::io::Result<()> {
    let mut command = Command::new(executable);
    if let Some(dir) = executable.parent() {
        command.current_dir(dir);
    }
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    info!("Launched {} (pid {})", executable.display(), child.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_install_params() {
        assert_eq!(split_install_params("/S"), vec!["/S"]);
        assert_eq!(
            split_install_params("/VERYSILENT  /NORESTART"),
            vec!["/VERYSILENT", "/NORESTART"]
        );
        assert_eq!(
            split_install_params(r#"/S /D="C:\Program Files\App""#),
            vec!["/S", r"/D=C:\Program Files\App"]
        );
        assert_eq!(split_install_params(r#""" /q"#), vec!["", "/q"]);
        assert!(split_install_params("   ").is_empty());
    }

    #[test]
    fn test_extract_args() {
        let args = extract_args(Path::new("app.zip"), Path::new("out"));
        assert_eq!(args, vec!["x", "-y", "-oout", "app.zip"]);
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("a.ZIP")));
        assert!(is_archive(Path::new("a.7z")));
        assert!(is_archive(Path::new("a.rar")));
        assert!(!is_archive(Path::new("a.exe")));
        assert!(!is_archive(Path::new("zip")));
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let runner = SystemProcessRunner::default();
        let stop = AtomicBool::new(false);
        let invocation = Invocation::new("definitely-not-a-real-program-4821", vec![]);
        let err = runner.run(&invocation, &stop).unwrap_err();
        assert!(matches!(err, TaskError::SpawnFailed { .. }));
    }

    #[test]
    fn test_stop_before_spawn() {
        let runner = SystemProcessRunner::default();
        let stop = AtomicBool::new(true);
        let invocation = Invocation::new("definitely-not-a-real-program-4821", vec![]);
        assert_eq!(runner.run(&invocation, &stop).unwrap(), ProcessExit::Stopped);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_and_stderr_are_captured() {
        let runner = SystemProcessRunner::new(Duration::from_millis(20));
        let stop = AtomicBool::new(false);
        let invocation = Invocation::new(
            "sh",
            vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
        );
        match runner.run(&invocation, &stop).unwrap() {
            ProcessExit::Exited { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected exit: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_process() {
        let runner = SystemProcessRunner::new(Duration::from_millis(20));
        let stop = AtomicBool::new(false);
        let invocation = Invocation::new("sleep", vec!["5".to_string()])
            .with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        assert!(matches!(
            runner.run(&invocation, &stop).unwrap(),
            ProcessExit::TimedOut(_)
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_kills_running_process() {
        let runner = SystemProcessRunner::new(Duration::from_millis(20));
        let stop = std::sync::Arc::new(AtomicBool::new(false));
        let invocation = Invocation::new("sleep", vec!["5".to_string()])
            .with_timeout(Duration::from_secs(60));

        let stopper = {
            let stop = std::sync::Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(200));
                stop.store(true, Ordering::SeqCst);
            })
        };

        let started = Instant::now();
        let exit = runner.run(&invocation, &stop).unwrap();
        stopper.join().unwrap();

        assert!(matches!(exit, ProcessExit::Stopped), "unexpected exit: {exit:?}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: Unquoted tokens survive a join/split cycle
            #[test]
            fn plain_tokens_split_on_whitespace(
                tokens in prop::collection::vec("[A-Za-z0-9/=:._\\\\-]{1,12}", 0..6)
            ) {
                let joined = tokens.join(" ");
                prop_assert_eq!(split_install_params(&joined), tokens);
            }

            /// Property: A quoted token is kept whole, spaces included
            #[test]
            fn quoted_token_is_kept_whole(inner in "[A-Za-z0-9 ]{0,16}") {
                let params = format!("/S \"{inner}\"");
                let args = split_install_params(&params);
                prop_assert_eq!(args, vec!["/S".to_string(), inner]);
            }
        }
    }
}
