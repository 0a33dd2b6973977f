//! Shared blocking HTTP helpers
//!
//! Every network call in the application is a single attempt with a short
//! fixed timeout. Callers decide how to degrade when it fails.

use crate::error::{AisError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for catalog, icon and release metadata requests
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for whole release asset bodies, which run to several megabytes
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for the connectivity probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a blocking client with the application user agent
pub fn client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(format!("TekDT-AIS/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            warn!("Failed to create HTTP client: {}", e);
            // Preserve error chain by wrapping the source error
            AisError::NetworkError(Box::new(e))
        })
}

/// GET `url` and return the body, treating non-success statuses as errors
pub fn get_bytes(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    debug!("GET {}", url);
    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| AisError::NetworkError(Box::new(e)))?;
    let body = response
        .bytes()
        .map_err(|e| AisError::NetworkError(Box::new(e)))?;
    Ok(body.to_vec())
}

/// Whether `probe_url` answers within [`PROBE_TIMEOUT`]
///
/// Any HTTP response counts as online; only transport failures count as
/// offline.
pub fn is_online(probe_url: &str) -> bool {
    let Ok(client) = client(PROBE_TIMEOUT) else {
        return false;
    };

    match client.get(probe_url).send() {
        Ok(response) => {
            debug!("Connectivity probe answered with {}", response.status());
            true
        }
        Err(e) => {
            warn!("Connectivity probe failed: {}", e);
            false
        }
    }
}
