//! Configuration management module
//!
//! This module handles the installation layout, the runtime context passed to
//! every component, and loading/saving `app_config.json` with atomic writes
//! to prevent corruption.

pub mod manager;
pub mod models;
pub mod paths;

pub use manager::{ConfigStore, HealReport};
pub use models::{AppConfig, AppRecord, AppType, OsArch};
pub use paths::{AppContext, AppPaths, Endpoints, WorkerOptions};
