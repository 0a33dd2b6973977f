//! Application directories and runtime context
//!
//! Every component receives an [`AppContext`] built once at startup instead of
//! reading module-level paths. The base directory defaults to the folder that
//! holds the executable and can be overridden with `TEKDT_AIS_HOME`.

use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the base directory
pub const HOME_ENV_VAR: &str = "TEKDT_AIS_HOME";

/// Name of the configuration file inside the base directory
pub const CONFIG_FILE_NAME: &str = "app_config.json";

/// Icon file used when an app has no cached icon
pub const DEFAULT_ICON_FILE: &str = "default.png";

/// Remote catalog location
pub const REMOTE_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/tekdt/tekdtais/main/app_list.json";

/// Host used to probe Internet reachability
pub const CONNECTIVITY_PROBE_URL: &str = "https://www.google.com";

/// Filesystem layout of an installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Base directory
    pub base_dir: PathBuf,
    /// Per-app download directories live here (`Apps/<app_key>/`)
    pub apps_dir: PathBuf,
    /// Shared images such as the default icon
    pub images_dir: PathBuf,
    /// Bundled external tools
    pub tools_dir: PathBuf,
    /// Log files
    pub logs_dir: PathBuf,
    /// `app_config.json`
    pub config_file: PathBuf,
}

impl AppPaths {
    /// Build the layout rooted at `base_dir`
    pub fn from_base(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            apps_dir: base_dir.join("Apps"),
            images_dir: base_dir.join("Images"),
            tools_dir: base_dir.join("Tools"),
            logs_dir: base_dir.join("Logs"),
            config_file: base_dir.join(CONFIG_FILE_NAME),
            base_dir,
        }
    }

    /// Resolve the base directory from `TEKDT_AIS_HOME` or the executable location
    pub fn discover() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            return Self::from_base(PathBuf::from(home));
        }

        let base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_base(base)
    }

    /// Create every directory of the layout
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.base_dir,
            &self.apps_dir,
            &self.images_dir,
            &self.tools_dir,
            &self.logs_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Directory holding the files of one app
    pub fn app_dir(&self, app_key: &str) -> PathBuf {
        self.apps_dir.join(app_key)
    }

    /// Path of the shared default icon
    pub fn default_icon(&self) -> PathBuf {
        self.images_dir.join(DEFAULT_ICON_FILE)
    }
}

/// Whether `name` names an entry directly inside a directory
///
/// Rejects empty names, `.` and `..`, and anything carrying a path
/// separator, drive prefix or stream suffix on either platform.
pub fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', ':', '\0'])
}

/// Whether `path` is a relative path that stays below its base directory
///
/// Both separators are accepted so catalog entries written for Windows
/// resolve the same everywhere.
pub fn is_contained_relative(path: &str) -> bool {
    path.split(['/', '\\']).all(is_single_component)
}

/// Tunables for the task worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Downloads allowed in flight at once (1 = strictly serial)
    pub max_parallel_downloads: usize,
    /// Maximum time an installer may run before it is terminated
    pub install_timeout: Duration,
    /// Interval at which blocking waits re-check the stop flag
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_parallel_downloads: 3,
            install_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Remote endpoints contacted by the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Remote catalog JSON
    pub catalog_url: String,
    /// Lightweight reachability probe
    pub probe_url: String,
    /// GitHub owner of the application's own releases
    pub self_repo_owner: String,
    /// GitHub repository of the application's own releases
    pub self_repo_name: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            catalog_url: REMOTE_CATALOG_URL.to_string(),
            probe_url: CONNECTIVITY_PROBE_URL.to_string(),
            self_repo_owner: "tekdt".to_string(),
            self_repo_name: "tekdtais".to_string(),
        }
    }
}

/// Explicit configuration passed to every component
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Directory layout
    pub paths: AppPaths,
    /// Remote endpoints
    pub endpoints: Endpoints,
    /// Worker tunables
    pub worker: WorkerOptions,
}

impl AppContext {
    /// Context rooted at `paths` with default endpoints and worker options
    pub fn new(paths: AppPaths) -> Self {
        Self {
            paths,
            endpoints: Endpoints::default(),
            worker: WorkerOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_base() {
        let paths = AppPaths::from_base("C:\\TekDT");
        assert_eq!(paths.apps_dir, PathBuf::from("C:\\TekDT").join("Apps"));
        assert_eq!(paths.tools_dir, PathBuf::from("C:\\TekDT").join("Tools"));
        assert!(paths.config_file.ends_with(CONFIG_FILE_NAME));
        assert_eq!(paths.app_dir("vlc"), paths.apps_dir.join("vlc"));
        assert!(paths.default_icon().ends_with(DEFAULT_ICON_FILE));
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_base(temp_dir.path().join("ais"));

        paths.ensure_dirs().unwrap();

        assert!(paths.apps_dir.is_dir());
        assert!(paths.images_dir.is_dir());
        assert!(paths.tools_dir.is_dir());
        assert!(paths.logs_dir.is_dir());
    }

    #[test]
    fn test_single_component_names() {
        assert!(is_single_component("vlc"));
        assert!(is_single_component("setup-3.0.20.exe"));
        assert!(is_single_component("..hidden"));

        for bad in ["", ".", "..", "../evil.exe", "a/b", "a\\b", "C:evil.exe", "x.exe:stream"] {
            assert!(!is_single_component(bad), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_contained_relative_paths() {
        assert!(is_contained_relative("app.exe"));
        assert!(is_contained_relative("bin/app.exe"));
        assert!(is_contained_relative("bin\\app.exe"));

        assert!(!is_contained_relative("../app.exe"));
        assert!(!is_contained_relative("bin/../../app.exe"));
        assert!(!is_contained_relative("/usr/bin/app"));
        assert!(!is_contained_relative("C:\\Windows\\notepad.exe"));
        assert!(!is_contained_relative("\\\\server\\share\\app.exe"));
    }

    #[test]
    fn test_default_worker_options() {
        let options = WorkerOptions::default();
        assert_eq!(options.max_parallel_downloads, 3);
        assert_eq!(options.install_timeout, Duration::from_secs(600));
        assert!(options.poll_interval < Duration::from_secs(1));
    }
}
