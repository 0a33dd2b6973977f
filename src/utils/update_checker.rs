//! Self-update check
//!
//! Compares the running version with the latest GitHub release of the
//! application's own repository. Checks are rate limited through the
//! `last_update_check` setting and never block startup on failure.

use crate::config::{ConfigStore, Endpoints};
use crate::error::{AisError, Result, StringError};
use crate::utils::http;
use semver::Version;
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Minimum time between two checks
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    html_url: Option<String>,
}

/// Result of a successful check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheckResult {
    /// Running version
    pub current_version: Version,
    /// Latest published version
    pub latest_version: Version,
    /// Whether `latest_version` is newer
    pub update_available: bool,
    /// Page to send the user to
    pub release_url: String,
}

/// Checks GitHub for a newer release of the application
#[derive(Debug, Clone)]
pub struct UpdateChecker {
    api_url: String,
    releases_page: String,
    current_version: Version,
    min_check_interval_secs: u64,
}

impl UpdateChecker {
    /// Checker for `owner/repo`
    pub fn new(
        owner: &str,
        repo: &str,
        current_version: Version,
        min_check_interval_secs: u64,
    ) -> Self {
        Self {
            api_url: format!("https://api.github.com/repos/{owner}/{repo}/releases/latest"),
            releases_page: format!("https://github.com/{owner}/{repo}/releases"),
            current_version,
            min_check_interval_secs,
        }
    }

    /// Checker for the application's own repository and version
    pub fn for_application(endpoints: &Endpoints) -> Self {
        let current = Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or(Version::new(0, 0, 0));
        Self::new(
            &endpoints.self_repo_owner,
            &endpoints.self_repo_name,
            current,
            DEFAULT_CHECK_INTERVAL_SECS,
        )
    }

    /// Whether enough time passed since `last_check` (Unix seconds, 0 = never)
    pub fn should_check(&self, last_check: u64) -> bool {
        last_check == 0
            || current_timestamp().saturating_sub(last_check) >= self.min_check_interval_secs
    }

    /// Query GitHub for the latest release
    pub fn check_for_updates(&self) -> Result<UpdateCheckResult> {
        debug!("Fetching {}", self.api_url);
        let client = http::client(http::REQUEST_TIMEOUT)?;
        let body = http::get_bytes(&client, &self.api_url)?;
        let release: LatestRelease = serde_json::from_slice(&body)?;
        self.evaluate(release)
    }

    fn evaluate(&self, release: LatestRelease) -> Result<UpdateCheckResult> {
        if release.prerelease {
            return Err(AisError::NetworkError(StringError::new(
                "Latest release is a prerelease",
            )));
        }

        let tag = release.tag_name.trim_start_matches(['v', 'V']);
        let latest_version = Version::parse(tag).map_err(|e| {
            warn!("Unparseable release tag '{}': {}", release.tag_name, e);
            AisError::NetworkError(Box::new(e))
        })?;
        let update_available = latest_version > self.current_version;

        Ok(UpdateCheckResult {
            current_version: self.current_version.clone(),
            latest_version,
            update_available,
            release_url: release
                .html_url
                .unwrap_or_else(|| self.releases_page.clone()),
        })
    }

    /// Check if due, record the attempt, and return the result
    ///
    /// Returns `None` when the check is not due or failed.
    pub fn check_if_due(&self, store: &ConfigStore) -> Option<UpdateCheckResult> {
        let last = store.load().last_update_check();
        if !self.should_check(last) {
            debug!("Skipping update check, last one at {}", last);
            return None;
        }

        if let Err(e) = store.update(|config| config.set_last_update_check(current_timestamp())) {
            warn!("Failed to record update check time: {}", e);
        }

        match self.check_for_updates() {
            Ok(result) => {
                if result.update_available {
                    info!(
                        "Update available: {} -> {}",
                        result.current_version, result.latest_version
                    );
                } else {
                    info!("TekDT AIS is up to date ({})", result.current_version);
                }
                Some(result)
            }
            Err(e) => {
                warn!("Update check failed: {}", e);
                None
            }
        }
    }
}

/// Current Unix time in seconds
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
