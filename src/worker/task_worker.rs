//! Task worker
//!
//! Runs a batch of download/install/update tasks off the caller's thread.
//! Downloads run on their own threads, at most `max_parallel_downloads` at a
//! time. Installers run one at a time on the coordinator thread, since
//! Windows installers generally refuse to run concurrently. An app is
//! committed to the configuration only after every step of its task
//! succeeded.

use crate::catalog::status::{download_path, is_download_complete};
use crate::config::{AppPaths, AppRecord, AppType, ConfigStore, WorkerOptions};
use crate::error::{AisError, Result, TaskError};
use crate::tools::ToolProvisioner;
use crate::worker::downloader::{Aria2Downloader, DownloadRequest, Downloader};
use crate::worker::icon::{HttpIconFetcher, IconFetcher, cache_icon};
use crate::worker::process::{
    Invocation, ProcessExit, ProcessRunner, SystemProcessRunner, extract_args, is_archive,
    split_install_params,
};
use crate::worker::task::{BatchSummary, Task, TaskAction, TaskOutcome, TaskStatus, WorkerEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Pluggable side effects of the worker
#[derive(Clone)]
pub struct WorkerBackends {
    /// Fetches installers and archives
    pub downloader: Arc<dyn Downloader>,
    /// Runs installers and the extractor
    pub runner: Arc<dyn ProcessRunner>,
    /// Fetches icons
    pub icons: Arc<dyn IconFetcher>,
}

impl WorkerBackends {
    /// Real aria2c, child processes and HTTP
    pub fn system(paths: &AppPaths, options: &WorkerOptions) -> Self {
        Self {
            downloader: Arc::new(Aria2Downloader::new(
                ToolProvisioner::aria2_path(paths),
                options.poll_interval,
            )),
            runner: Arc::new(SystemProcessRunner::new(options.poll_interval)),
            icons: Arc::new(HttpIconFetcher),
        }
    }
}

/// Result of the download phase of one task
#[derive(Debug)]
struct Prepared {
    /// Downloaded file
    file: PathBuf,
    /// `icon_file` value to commit
    icon_file: String,
}

/// Message from a download thread to the coordinator
struct DownloadDone {
    task: Task,
    result: std::result::Result<Prepared, TaskError>,
}

/// Executes task batches
#[derive(Clone)]
pub struct TaskWorker {
    paths: AppPaths,
    store: Arc<ConfigStore>,
    backends: WorkerBackends,
    options: WorkerOptions,
}

/// Handle to a running batch
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<BatchSummary>,
}

impl WorkerHandle {
    /// Request cancellation
    ///
    /// Running subprocesses are killed and tasks not yet started end as
    /// stopped. [`WorkerEvent::Finished`] is still emitted.
    pub fn stop(&self) {
        info!("Stop requested for running batch");
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the batch has completed
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the batch and return its summary
    pub fn join(self) -> Result<BatchSummary> {
        self.thread
            .join()
            .map_err(|_| AisError::WorkerError("worker thread panicked".to_string()))
    }
}

impl TaskWorker {
    /// Create a worker
    pub fn new(
        paths: AppPaths,
        store: Arc<ConfigStore>,
        backends: WorkerBackends,
        options: WorkerOptions,
    ) -> Self {
        Self {
            paths,
            store,
            backends,
            options,
        }
    }

    /// Run `tasks` on a background thread, reporting to `events`
    pub fn spawn(self, tasks: Vec<Task>, events: Sender<WorkerEvent>) -> Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("task-worker".to_string())
            .spawn(move || self.run(tasks, &events, &stop_flag))
            .map_err(|e| AisError::WorkerError(format!("failed to start worker thread: {e}")))?;

        Ok(WorkerHandle { stop, thread })
    }

    /// Run `tasks` on the current thread
    ///
    /// Emits exactly one [`WorkerEvent::Finished`], even if the coordinator
    /// panics part way through.
    pub fn run(
        &self,
        tasks: Vec<Task>,
        events: &Sender<WorkerEvent>,
        stop: &Arc<AtomicBool>,
    ) -> BatchSummary {
        info!("Starting batch of {} tasks", tasks.len());
        let summary = Mutex::new(BatchSummary::default());
        let submitted = tasks.clone();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.coordinate(tasks, events, stop, &summary);
        }));

        let mut summary = summary.into_inner();
        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            error!("Task worker panicked: {}", message);
            send(events, WorkerEvent::WorkerError(message.clone()));
            for task in submitted {
                if summary.outcome(&task.app_key).is_none() {
                    summary.outcomes.push(TaskOutcome {
                        app_key: task.app_key,
                        action: task.action,
                        status: TaskStatus::Failed,
                        message: TaskError::Panicked(message.clone()).to_string(),
                    });
                }
            }
        }

        info!("Batch finished: {}", summary);
        send(events, WorkerEvent::Finished(summary.clone()));
        summary
    }

    fn coordinate(
        &self,
        tasks: Vec<Task>,
        events: &Sender<WorkerEvent>,
        stop: &Arc<AtomicBool>,
        summary: &Mutex<BatchSummary>,
    ) {
        let mut queue: VecDeque<Task> = tasks.into();
        let (done_tx, done_rx) = mpsc::channel::<DownloadDone>();
        let max_in_flight = self.options.max_parallel_downloads.max(1);
        let mut in_flight = 0usize;

        loop {
            while in_flight < max_in_flight && !stop.load(Ordering::SeqCst) {
                let Some(task) = queue.pop_front() else {
                    break;
                };
                match self.start_download(task.clone(), events, stop, &done_tx) {
                    Ok(()) => in_flight += 1,
                    Err(e) => {
                        error!("Failed to start download thread for {}: {}", task.app_key, e);
                        record(events, summary, &task, TaskStatus::Failed, e.to_string());
                    }
                }
            }

            if in_flight == 0 {
                break;
            }

            match done_rx.recv_timeout(self.options.poll_interval) {
                Ok(done) => {
                    in_flight -= 1;
                    self.finish(done, events, stop, summary);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Unreachable while done_tx is alive; bail out rather than spin
                    warn!("Download channel closed with {} tasks in flight", in_flight);
                    break;
                }
            }
        }

        for task in queue {
            record(
                events,
                summary,
                &task,
                TaskStatus::Stopped,
                TaskError::Stopped.to_string(),
            );
        }
    }

    fn start_download(
        &self,
        task: Task,
        events: &Sender<WorkerEvent>,
        stop: &Arc<AtomicBool>,
        done_tx: &Sender<DownloadDone>,
    ) -> std::io::Result<()> {
        let worker = self.clone();
        let events = events.clone();
        let stop = Arc::clone(stop);
        let done_tx = done_tx.clone();
        let name = format!("download-{}", task.app_key);

        thread::Builder::new().name(name).spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                worker.prepare(&task, &events, &stop)
            }))
            .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))));

            if done_tx.send(DownloadDone { task, result }).is_err() {
                warn!("Coordinator gone before download result was delivered");
            }
        })?;
        Ok(())
    }

    /// Download phase: fetch the file and the icon
    fn prepare(
        &self,
        task: &Task,
        events: &Sender<WorkerEvent>,
        stop: &AtomicBool,
    ) -> std::result::Result<Prepared, TaskError> {
        let key = task.app_key.as_str();
        send(
            events,
            WorkerEvent::Progress {
                app_key: key.to_string(),
                status: TaskStatus::Downloading,
                message: "Downloading...".to_string(),
            },
        );

        let url = task
            .info
            .download_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| TaskError::DownloadFailed {
                code: None,
                stderr: "no download URL in catalog entry".to_string(),
            })?;
        let file = download_path(&self.paths, key, &task.info).ok_or_else(|| {
            TaskError::DownloadFailed {
                code: None,
                stderr: "no safe file name for the download".to_string(),
            }
        })?;
        let dir = self.paths.app_dir(key);
        fs::create_dir_all(&dir)?;

        if task.action == TaskAction::Update {
            remove_previous_download(&file)?;
        }

        if is_download_complete(&file) {
            info!("{} already downloaded, skipping download", file.display());
        } else {
            let request = DownloadRequest {
                url: url.to_string(),
                dir,
                file_name: file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                referer: task.info.referer.clone(),
            };
            let progress_events = events.clone();
            let progress_key = key.to_string();
            self.backends.downloader.download(&request, stop, &move |percent| {
                send(
                    &progress_events,
                    WorkerEvent::Percent {
                        app_key: progress_key.clone(),
                        percent,
                    },
                );
            })?;

            if !file.is_file() {
                return Err(TaskError::DownloadFailed {
                    code: Some(0),
                    stderr: format!("{} missing after download", file.display()),
                });
            }
        }
        send(
            events,
            WorkerEvent::Percent {
                app_key: key.to_string(),
                percent: 100,
            },
        );

        let icon_file = cache_icon(
            self.backends.icons.as_ref(),
            &self.paths,
            key,
            task.info.icon_url.as_deref(),
        );

        Ok(Prepared { file, icon_file })
    }

    /// Install phase and commit, on the coordinator thread
    fn finish(
        &self,
        done: DownloadDone,
        events: &Sender<WorkerEvent>,
        stop: &AtomicBool,
        summary: &Mutex<BatchSummary>,
    ) {
        let DownloadDone { task, result } = done;

        let outcome = result.and_then(|prepared| {
            let installs = task.runs_installer() && has_install_step(&task.info, &prepared.file);
            if installs {
                if stop.load(Ordering::SeqCst) {
                    return Err(TaskError::Stopped);
                }
                send(
                    events,
                    WorkerEvent::Progress {
                        app_key: task.app_key.clone(),
                        status: TaskStatus::Installing,
                        message: "Installing...".to_string(),
                    },
                );
                self.install(&task, &prepared, stop)?;
            }
            Ok((prepared, installs))
        });

        match outcome {
            Ok((prepared, installed)) => match self
                .store
                .commit_app(&task.app_key, &task.info, &prepared.icon_file)
            {
                Ok(_) => {
                    let message = if installed {
                        "Installed successfully"
                    } else {
                        "Download complete"
                    };
                    record(events, summary, &task, TaskStatus::Success, message.to_string());
                }
                Err(e) => {
                    error!("Failed to commit {}: {}", task.app_key, e);
                    record(
                        events,
                        summary,
                        &task,
                        TaskStatus::Failed,
                        format!("Failed to save configuration: {e}"),
                    );
                }
            },
            Err(e) if e.is_stopped() => {
                record(events, summary, &task, TaskStatus::Stopped, e.to_string());
            }
            Err(e) => {
                warn!("Task {} ({}) failed: {}", task.app_key, task.action, e);
                record(events, summary, &task, TaskStatus::Failed, e.to_string());
            }
        }
    }

    fn install(
        &self,
        task: &Task,
        prepared: &Prepared,
        stop: &AtomicBool,
    ) -> std::result::Result<(), TaskError> {
        let dir = self.paths.app_dir(&task.app_key);
        let timeout = self.options.install_timeout;

        if is_archive(&prepared.file) {
            let invocation = Invocation::new(
                ToolProvisioner::seven_zip_path(&self.paths),
                extract_args(&prepared.file, &dir),
            )
            .in_dir(&dir)
            .with_timeout(timeout);

            return match self.backends.runner.run(&invocation, stop)? {
                exit if exit.is_success() => Ok(()),
                ProcessExit::Exited { code, .. } => Err(TaskError::ExtractFailed { code }),
                ProcessExit::Stopped => Err(TaskError::Stopped),
                ProcessExit::TimedOut(limit) => Err(TaskError::InstallTimedOut(limit)),
            };
        }

        let args = split_install_params(task.info.install_params.as_deref().unwrap_or_default());
        let invocation = Invocation::new(&prepared.file, args)
            .in_dir(&dir)
            .with_timeout(timeout);

        match self.backends.runner.run(&invocation, stop)? {
            exit if exit.is_success() => Ok(()),
            ProcessExit::Exited { code, .. } => Err(TaskError::InstallFailed { code }),
            ProcessExit::Stopped => Err(TaskError::Stopped),
            ProcessExit::TimedOut(limit) => Err(TaskError::InstallTimedOut(limit)),
        }
    }
}

/// Whether installing `record` from `file` runs anything
///
/// Archives are unpacked with 7-Zip. A portable app that is not an archive
/// is used in place.
fn has_install_step(record: &AppRecord, file: &Path) -> bool {
    record.kind() != AppType::Portable || is_archive(file)
}

/// Emit the terminal status of `task` and add it to the summary
fn record(
    events: &Sender<WorkerEvent>,
    summary: &Mutex<BatchSummary>,
    task: &Task,
    status: TaskStatus,
    message: String,
) {
    debug_assert!(status.is_terminal());
    debug!("{} -> {}: {}", task.app_key, status, message);
    send(
        events,
        WorkerEvent::Progress {
            app_key: task.app_key.clone(),
            status,
            message: message.clone(),
        },
    );
    summary.lock().outcomes.push(TaskOutcome {
        app_key: task.app_key.clone(),
        action: task.action,
        status,
        message,
    });
}

/// Delete a previous download and its aria2 control file
fn remove_previous_download(file: &std::path::Path) -> std::io::Result<()> {
    let mut control = file.as_os_str().to_owned();
    control.push(".aria2");
    for path in [file.to_path_buf(), PathBuf::from(control)] {
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn send(events: &Sender<WorkerEvent>, event: WorkerEvent) {
    if events.send(event).is_err() {
        debug!("Event receiver dropped");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
