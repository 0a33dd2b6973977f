#![expect(
    clippy::unwrap_used,
    reason = "Test utilities use .unwrap() for brevity"
)]

//! Shared fixtures for unit tests
//!
//! Only compiled during testing (`#[cfg(test)]`).

use crate::config::{AppPaths, AppRecord, AppType, ConfigStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A complete directory layout rooted in a temporary directory
///
/// The directory is removed when the layout is dropped.
pub struct TestLayout {
    _dir: TempDir,
    /// Paths under the temporary base directory
    pub paths: AppPaths,
    /// Config store backed by `paths.config_file`
    pub store: Arc<ConfigStore>,
}

impl TestLayout {
    /// Create the layout with every directory present
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_base(dir.path());
        paths.ensure_dirs().unwrap();
        let store = Arc::new(ConfigStore::for_paths(&paths));
        Self {
            _dir: dir,
            paths,
            store,
        }
    }
}

/// Installer record downloading `https://example/<key>.exe`
pub fn installer_record(key: &str, version: &str) -> AppRecord {
    AppRecord {
        version: Some(version.to_string()),
        app_type: Some(AppType::Installer),
        download_url: Some(format!("https://example/{key}.exe")),
        ..AppRecord::default()
    }
}
