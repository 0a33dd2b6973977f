//! App catalog module
//!
//! Remote catalog retrieval, dotted version comparison and the status of
//! each entry relative to what is already on disk.

pub mod client;
pub mod status;
pub mod version;

use crate::config::AppRecord;
use std::collections::BTreeMap;

/// Map of app key to record, either local `app_items` or the remote catalog
pub type Catalog = BTreeMap<String, AppRecord>;

pub use client::CatalogClient;
pub use status::{AppStatus, CatalogOrigin, app_status, effective_catalog, search};
pub use version::{AppVersion, is_newer, needs_update};
