//! Tool provisioning
//!
//! The application needs two external executables: aria2c for downloads and
//! 7-Zip's standalone `7zr.exe` for portable archives. At startup each one is
//! compared against its latest GitHub release and refreshed when the cached
//! `.version` marker differs. Offline, whatever is on disk is accepted.

use crate::config::{AppPaths, Endpoints};
use crate::error::{AisError, Result, StringError};
use crate::tools::release::{
    AssetMatcher, GitHubRelease, fetch_latest_release, replace_dir_with, unpack_zip_flatten,
};
use crate::utils::http;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Name of the marker file holding the installed release tag
pub const VERSION_MARKER: &str = ".version";

/// How a release asset becomes the tool executable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// The asset is the executable itself
    Executable,
    /// The asset is a zip containing the executable
    ZipArchive,
}

/// Static description of one provisioned tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    /// Human readable name for logs and messages
    pub name: &'static str,
    /// Directory under `Tools/`
    pub dir_name: &'static str,
    /// Executable file name inside that directory
    pub exe_name: &'static str,
    /// GitHub "latest release" API URL
    pub release_api_url: String,
    /// How to pick the asset
    pub matcher: AssetMatcher,
    /// How to install the asset
    pub kind: AssetKind,
}

impl ToolSpec {
    /// aria2, shipped as a zip with a versioned top-level folder
    pub fn aria2() -> Self {
        Self {
            name: "aria2",
            dir_name: "aria2",
            exe_name: "aria2c.exe",
            release_api_url: "https://api.github.com/repos/aria2/aria2/releases/latest".to_string(),
            matcher: AssetMatcher::KeywordSuffix {
                keyword: "win-64bit",
                suffix: ".zip",
            },
            kind: AssetKind::ZipArchive,
        }
    }

    /// 7-Zip standalone console extractor
    pub fn seven_zip() -> Self {
        Self {
            name: "7-Zip",
            dir_name: "7z",
            exe_name: "7zr.exe",
            release_api_url: "https://api.github.com/repos/ip7z/7zip/releases/latest".to_string(),
            matcher: AssetMatcher::Exact("7zr.exe"),
            kind: AssetKind::Executable,
        }
    }

    /// Tool directory under `tools_dir`
    pub fn dir(&self, tools_dir: &Path) -> PathBuf {
        tools_dir.join(self.dir_name)
    }

    /// Executable path under `tools_dir`
    pub fn exe_path(&self, tools_dir: &Path) -> PathBuf {
        self.dir(tools_dir).join(self.exe_name)
    }
}

/// Outcome of [`ToolProvisioner::ensure_tools_current`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Every tool is present and matches its latest release
    Current,
    /// Tools are present but could not be verified or refreshed
    Degraded(String),
    /// At least one tool is missing and could not be obtained
    Missing(String),
}

impl ProvisionOutcome {
    /// Whether the application can proceed
    pub fn is_ok(&self) -> bool {
        !matches!(self, ProvisionOutcome::Missing(_))
    }

    /// Message for the user
    pub fn message(&self) -> &str {
        match self {
            ProvisionOutcome::Current => "Tools are up to date",
            ProvisionOutcome::Degraded(msg) | ProvisionOutcome::Missing(msg) => msg,
        }
    }
}

/// Keeps aria2c and 7zr present and current
#[derive(Debug, Clone)]
pub struct ToolProvisioner {
    /// `Tools/` directory
    tools_dir: PathBuf,
    /// Connectivity probe URL
    probe_url: String,
    /// Tools to manage
    tools: Vec<ToolSpec>,
}

impl ToolProvisioner {
    /// Provisioner for the standard tool set
    pub fn new(paths: &AppPaths, endpoints: &Endpoints) -> Self {
        Self::with_tools(
            paths.tools_dir.clone(),
            endpoints.probe_url.clone(),
            vec![ToolSpec::aria2(), ToolSpec::seven_zip()],
        )
    }

    /// Provisioner for an explicit tool list
    pub fn with_tools(tools_dir: PathBuf, probe_url: String, tools: Vec<ToolSpec>) -> Self {
        Self {
            tools_dir,
            probe_url,
            tools,
        }
    }

    /// Path of the aria2c executable
    pub fn aria2_path(paths: &AppPaths) -> PathBuf {
        ToolSpec::aria2().exe_path(&paths.tools_dir)
    }

    /// Path of the 7zr executable
    pub fn seven_zip_path(paths: &AppPaths) -> PathBuf {
        ToolSpec::seven_zip().exe_path(&paths.tools_dir)
    }

    /// Make sure every tool exists, refreshing from GitHub when online
    pub fn ensure_tools_current(&self) -> ProvisionOutcome {
        if let Err(e) = fs::create_dir_all(&self.tools_dir) {
            warn!("Failed to create tools directory: {}", e);
        }

        if !http::is_online(&self.probe_url) {
            return self.offline_outcome();
        }

        let mut failures = Vec::new();
        for tool in &self.tools {
            if let Err(e) = self.refresh_tool(tool) {
                warn!("Failed to update {}: {}", tool.name, e);
                failures.push(format!("{}: {}", tool.name, e));
            }
        }

        let missing = self.missing_tools();
        if !missing.is_empty() {
            let msg = format!(
                "Required tools could not be obtained: {}. {}",
                missing.join(", "),
                failures.join("; ")
            );
            error!("{}", msg);
            return ProvisionOutcome::Missing(msg);
        }

        if failures.is_empty() {
            info!("All tools are current");
            ProvisionOutcome::Current
        } else {
            ProvisionOutcome::Degraded(format!(
                "Using existing tools, update failed: {}",
                failures.join("; ")
            ))
        }
    }

    fn offline_outcome(&self) -> ProvisionOutcome {
        let missing = self.missing_tools();
        if missing.is_empty() {
            warn!("Offline, using existing tools without update check");
            ProvisionOutcome::Degraded(
                "No internet connection. Using existing tools without checking for updates"
                    .to_string(),
            )
        } else {
            let msg = format!(
                "No internet connection and required tools are missing: {}",
                missing.join(", ")
            );
            error!("{}", msg);
            ProvisionOutcome::Missing(msg)
        }
    }

    /// Names of tools whose executable is absent
    pub fn missing_tools(&self) -> Vec<&'static str> {
        self.tools
            .iter()
            .filter(|tool| !tool.exe_path(&self.tools_dir).is_file())
            .map(|tool| tool.name)
            .collect()
    }

    fn refresh_tool(&self, tool: &ToolSpec) -> Result<()> {
        let release = fetch_latest_release(&tool.release_api_url)?;
        let exe = tool.exe_path(&self.tools_dir);
        let installed = read_marker(&tool.dir(&self.tools_dir));

        if exe.is_file() && installed.as_deref() == Some(release.tag_name.as_str()) {
            info!("{} is current ({})", tool.name, release.tag_name);
            return Ok(());
        }

        info!(
            "Updating {} from {} to {}",
            tool.name,
            installed.as_deref().unwrap_or("none"),
            release.tag_name
        );
        self.install_release(tool, &release)
    }

    fn install_release(&self, tool: &ToolSpec, release: &GitHubRelease) -> Result<()> {
        let asset = release.find_asset(tool.matcher).ok_or_else(|| {
            AisError::ToolProvisioningError(StringError::new(format!(
                "No matching asset for {} in release {}",
                tool.name, release.tag_name
            )))
        })?;

        let client = http::client(http::DOWNLOAD_TIMEOUT)?;
        let bytes = http::get_bytes(&client, &asset.browser_download_url)?;
        self.install_asset(tool, &release.tag_name, &asset.name, &bytes)
    }

    /// Swap in the tool directory built from a downloaded asset
    ///
    /// The new directory is assembled and checked aside, so a bad asset
    /// leaves the installed tool and its marker untouched.
    fn install_asset(
        &self,
        tool: &ToolSpec,
        tag: &str,
        asset_name: &str,
        bytes: &[u8],
    ) -> Result<()> {
        replace_dir_with(&tool.dir(&self.tools_dir), |staging| {
            match tool.kind {
                AssetKind::Executable => fs::write(staging.join(tool.exe_name), bytes)?,
                AssetKind::ZipArchive => unpack_zip_flatten(bytes, staging)?,
            }
            if !staging.join(tool.exe_name).is_file() {
                return Err(AisError::ToolProvisioningError(StringError::new(format!(
                    "{} not found after unpacking {}",
                    tool.exe_name, asset_name
                ))));
            }
            write_marker(staging, tag)
        })?;

        info!("{} updated to {}", tool.name, tag);
        Ok(())
    }
}

/// Installed release tag recorded in `dir`
pub fn read_marker(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join(VERSION_MARKER))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Record `tag` as the installed release in `dir`
pub fn write_marker(dir: &Path, tag: &str) -> Result<()> {
    fs::write(dir.join(VERSION_MARKER), tag)?;
    Ok(())
}
