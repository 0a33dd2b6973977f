//! Background task execution
//!
//! Downloads through aria2c, silent installer runs, portable archive
//! extraction and icon caching, all driven by [`TaskWorker`] and reported as
//! [`WorkerEvent`]s.

pub mod downloader;
pub mod icon;
pub mod process;
pub mod task;
pub mod task_worker;

pub use downloader::{Aria2Downloader, DownloadRequest, Downloader};
pub use icon::{HttpIconFetcher, IconFetcher};
pub use process::{Invocation, ProcessExit, ProcessRunner, SystemProcessRunner};
pub use task::{BatchSummary, Task, TaskAction, TaskOutcome, TaskStatus, WorkerEvent};
pub use task_worker::{TaskWorker, WorkerBackends, WorkerHandle};
