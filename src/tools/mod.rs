//! External tool management
//!
//! Downloads and refreshes the aria2c downloader and the 7-Zip extractor from
//! their GitHub releases.

pub mod provisioner;
pub mod release;

pub use provisioner::{ProvisionOutcome, ToolProvisioner, ToolSpec};
pub use release::{AssetMatcher, GitHubRelease, ReleaseAsset};
