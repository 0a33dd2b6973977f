//! Remote catalog client
//!
//! Fetches the JSON document listing every installable app. A single GET
//! with a fixed timeout; any failure yields `None` so the caller can fall
//! back to the locally known apps.

use crate::catalog::Catalog;
use crate::config::models::decode_app_items;
use crate::error::{AisError, Result, StringError};
use crate::utils::http;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Client for the remote app catalog
#[derive(Debug, Clone)]
pub struct CatalogClient {
    /// Catalog URL
    url: String,
    /// Request timeout
    timeout: Duration,
}

impl CatalogClient {
    /// Create a client for `url` with the default 10 s timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: http::REQUEST_TIMEOUT,
        }
    }

    /// Override the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the remote catalog, or `None` when it is unavailable
    pub fn fetch(&self) -> Option<Catalog> {
        match self.try_fetch() {
            Ok(catalog) => {
                info!("Remote catalog loaded with {} apps", catalog.len());
                Some(catalog)
            }
            Err(e) => {
                warn!("Remote catalog unavailable: {}", e);
                None
            }
        }
    }

    /// Fetch the remote catalog, reporting why it failed
    pub fn try_fetch(&self) -> Result<Catalog> {
        let client = http::client(self.timeout)?;
        let body = http::get_bytes(&client, &self.url)?;
        parse_catalog(&body)
    }
}

/// Decode a catalog document shaped `{"app_items": {...}}`
pub fn parse_catalog(body: &[u8]) -> Result<Catalog> {
    let value: Value = serde_json::from_slice(body)?;
    let Value::Object(mut root) = value else {
        return Err(AisError::NetworkError(StringError::new(
            "Catalog document is not a JSON object",
        )));
    };
    let items = root.remove("app_items").ok_or_else(|| {
        AisError::NetworkError(StringError::new("Catalog document has no app_items"))
    })?;
    Ok(decode_app_items(items, "catalog"))
}
