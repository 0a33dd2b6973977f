//! Task and event types exchanged with the task worker

use crate::config::AppRecord;
use std::fmt;

/// What to do with an app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAction {
    /// Download only
    Download,
    /// Download, then run the installer
    Install,
    /// Remove the previous download, download again, then install
    Update,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskAction::Download => "download",
            TaskAction::Install => "install",
            TaskAction::Update => "update",
        })
    }
}

/// One unit of work for the task worker
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Catalog key
    pub app_key: String,
    /// Catalog record the task acts on
    pub info: AppRecord,
    /// Requested action
    pub action: TaskAction,
}

impl Task {
    /// Create a task
    pub fn new(app_key: impl Into<String>, info: AppRecord, action: TaskAction) -> Self {
        Self {
            app_key: app_key.into(),
            info,
            action,
        }
    }

    /// Whether the task runs an installer once downloaded
    pub fn runs_installer(&self) -> bool {
        matches!(self.action, TaskAction::Install | TaskAction::Update)
    }
}

/// Per-task lifecycle status
///
/// A task moves through `Downloading`, optionally `Installing`, and ends in
/// exactly one of `Success`, `Failed` or `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Download in progress
    Downloading,
    /// Installer or extractor running
    Installing,
    /// Finished and committed to the configuration
    Success,
    /// Finished with an error
    Failed,
    /// Cancelled by a stop request
    Stopped,
}

impl TaskStatus {
    /// Whether no further status follows
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Stopped
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Downloading => "downloading",
            TaskStatus::Installing => "installing",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        })
    }
}

/// Final result of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Catalog key
    pub app_key: String,
    /// Requested action
    pub action: TaskAction,
    /// Terminal status
    pub status: TaskStatus,
    /// Human readable detail
    pub message: String,
}

/// Aggregate result of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// One outcome per submitted task, in completion order
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchSummary {
    fn count(&self, status: TaskStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Tasks that succeeded
    pub fn success_count(&self) -> usize {
        self.count(TaskStatus::Success)
    }

    /// Tasks that failed
    pub fn fail_count(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    /// Tasks cancelled by a stop request
    pub fn stopped_count(&self) -> usize {
        self.count(TaskStatus::Stopped)
    }

    /// Whether every task succeeded
    pub fn all_succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == TaskStatus::Success)
    }

    /// Outcome for `app_key`, if it was part of the batch
    pub fn outcome(&self, app_key: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.app_key == app_key)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.success_count(),
            self.fail_count()
        )?;
        if self.stopped_count() > 0 {
            write!(f, ", {} stopped", self.stopped_count())?;
        }
        Ok(())
    }
}

/// Events sent by the task worker to its observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Status change of one task
    Progress {
        /// Catalog key
        app_key: String,
        /// New status
        status: TaskStatus,
        /// Human readable detail
        message: String,
    },
    /// Download percentage of one task
    Percent {
        /// Catalog key
        app_key: String,
        /// 0..=100
        percent: u8,
    },
    /// Error not tied to a single task
    WorkerError(String),
    /// Emitted exactly once after every task reached a terminal status
    Finished(BatchSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(key: &str, status: TaskStatus) -> TaskOutcome {
        TaskOutcome {
            app_key: key.to_string(),
            action: TaskAction::Install,
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = BatchSummary {
            outcomes: vec![
                outcome("a", TaskStatus::Success),
                outcome("b", TaskStatus::Failed),
                outcome("c", TaskStatus::Success),
                outcome("d", TaskStatus::Stopped),
            ],
        };
        assert_eq!(summary.success_count(), 2);
        assert_eq!(summary.fail_count(), 1);
        assert_eq!(summary.stopped_count(), 1);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.to_string(), "2 succeeded, 1 failed, 1 stopped");
        assert_eq!(summary.outcome("b").unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Downloading.is_terminal());
        assert!(!TaskStatus::Installing.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_runs_installer() {
        let task = Task::new("vlc", AppRecord::default(), TaskAction::Download);
        assert!(!task.runs_installer());
        let task = Task::new("vlc", AppRecord::default(), TaskAction::Update);
        assert!(task.runs_installer());
    }
}
