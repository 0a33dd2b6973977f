//! `TekDT AIS` - software catalog, downloader and silent installer for Windows
//!
//! Presents a curated catalog of third-party software, downloads the selected
//! items with aria2c and runs their installers silently. Installed apps and
//! user settings live in a JSON file next to the executable, and updates are
//! detected by comparing dotted versions against the remote catalog.
//!
//! Components receive an explicit [`config::AppContext`] built once at
//! startup: [`config::ConfigStore`] persists state, [`catalog::CatalogClient`]
//! fetches the remote catalog, [`tools::ToolProvisioner`] keeps aria2c and
//! 7-Zip current, and [`worker::TaskWorker`] executes batches on background
//! threads.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod tools;
pub mod utils;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{AisError, Result};
