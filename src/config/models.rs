//! Configuration data models
//!
//! This module defines the data structures used for application configuration
//! and for catalog entries. The same [`AppRecord`] shape is used for the local
//! `app_items` map and for the remote catalog, joined by app key.

use crate::config::paths::is_single_component;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Settings key holding the apps selected for installation
pub const SELECTED_FOR_INSTALL_KEY: &str = "selected_for_install";
/// Settings key holding the unix timestamp of the last self-update check
pub const LAST_UPDATE_CHECK_KEY: &str = "last_update_check";
/// Settings key overriding the number of parallel downloads
pub const MAX_PARALLEL_DOWNLOADS_KEY: &str = "max_parallel_downloads";

/// How a downloaded file is used
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppType {
    /// Run with silent-install flags after download
    Installer,
    /// Used in place; never executed by the worker
    Portable,
    /// Any value this version does not understand (treated as installer),
    /// kept verbatim so it is written back unchanged
    Unknown(String),
}

impl From<String> for AppType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "installer" => AppType::Installer,
            "portable" => AppType::Portable,
            _ => AppType::Unknown(value),
        }
    }
}

impl From<AppType> for String {
    fn from(value: AppType) -> Self {
        match value {
            AppType::Installer => "installer".to_string(),
            AppType::Portable => "portable".to_string(),
            AppType::Unknown(raw) => raw,
        }
    }
}

/// Operating system architecture an app supports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OsArch {
    /// 32-bit Windows only
    Bit32,
    /// 64-bit Windows only
    Bit64,
    /// Either architecture
    Both,
    /// Any value this version does not understand (treated as both),
    /// kept verbatim so it is written back unchanged
    Unknown(String),
}

impl From<String> for OsArch {
    fn from(value: String) -> Self {
        match value.as_str() {
            "32bit" => OsArch::Bit32,
            "64bit" => OsArch::Bit64,
            "both" => OsArch::Both,
            _ => OsArch::Unknown(value),
        }
    }
}

impl From<OsArch> for String {
    fn from(value: OsArch) -> Self {
        match value {
            OsArch::Bit32 => "32bit".to_string(),
            OsArch::Bit64 => "64bit".to_string(),
            OsArch::Both => "both".to_string(),
            OsArch::Unknown(raw) => raw,
        }
    }
}

impl OsArch {
    /// Whether an app built for `self` runs on a system of `system` architecture
    pub fn supports(&self, system: &OsArch) -> bool {
        match self {
            OsArch::Both | OsArch::Unknown(_) => true,
            OsArch::Bit32 => *system == OsArch::Bit32,
            OsArch::Bit64 => *system == OsArch::Bit64,
        }
    }
}

/// Metadata describing one installable or downloadable software item
///
/// Every field is optional so that round-tripping a document never invents
/// keys; accessors document the default applied when a field is absent.
/// Keys this version does not know are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    /// Name shown to the user (defaults to the app key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Tooltip text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Catalog grouping (defaults to "Uncategorized")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Dotted version string (defaults to "0"); a bare JSON number is accepted
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    /// Where the installer or portable file is fetched from
    #[serde(
        default,
        alias = "download_link",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
    /// File name on disk (defaults to the basename of `download_url`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    /// Value for the HTTP `Referer` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Silent-install switches, tokenized shell-style
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_params: Option<String>,
    /// Installer or portable (defaults to installer)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub app_type: Option<AppType>,
    /// Entry point of a portable app, relative to its directory
    #[serde(
        default,
        alias = "executable_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub executable: Option<String>,
    /// Supported architecture (defaults to both)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatible_os_arch: Option<OsArch>,
    /// Remote icon image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Locally cached icon file name (defaults to `default.png`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_file: Option<String>,
    /// Install automatically on `/install` without an app list (defaults to false)
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_install: Option<bool>,
    /// Keys not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppRecord {
    /// Display name, falling back to the app key
    pub fn display_name_or<'a>(&'a self, app_key: &'a str) -> &'a str {
        self.display_name.as_deref().unwrap_or(app_key)
    }

    /// Category, falling back to "Uncategorized"
    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or("Uncategorized")
    }

    /// Version string, `"0"` when absent
    pub fn version_or_default(&self) -> &str {
        self.version.as_deref().unwrap_or("0")
    }

    /// Installer unless the record says portable
    pub fn kind(&self) -> AppType {
        match &self.app_type {
            Some(AppType::Portable) => AppType::Portable,
            _ => AppType::Installer,
        }
    }

    /// Supported architecture, both when absent
    pub fn arch(&self) -> OsArch {
        self.compatible_os_arch.clone().unwrap_or(OsArch::Both)
    }

    /// Whether `/install` without an app list should pick this app
    pub fn is_auto_install(&self) -> bool {
        self.auto_install.unwrap_or(false)
    }

    /// File name the download is stored under
    ///
    /// Uses `output_filename` when set, otherwise the last path segment of
    /// `download_url` with any query string or fragment removed. `None` when
    /// the result is not a plain file name, so it can never point outside the
    /// app directory.
    pub fn file_name(&self) -> Option<String> {
        if let Some(name) = self.output_filename.as_deref().filter(|n| !n.is_empty()) {
            return is_single_component(name).then(|| name.to_string());
        }

        let url = self.download_url.as_deref()?;
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| is_single_component(segment))
            .map(ToString::to_string)
    }

    /// Merge a remote catalog record into the locally known one
    ///
    /// Remote fields win. Fields the remote record lacks keep their local
    /// value, and `auto_install` is a local preference that always survives.
    pub fn merged_with_remote(local: Option<&AppRecord>, remote: &AppRecord) -> AppRecord {
        let Some(local) = local else {
            return remote.clone();
        };

        let mut merged = remote.clone();
        macro_rules! keep_local {
            ($($field:ident),+ $(,)?) => {
                $(
                    if merged.$field.is_none() {
                        merged.$field.clone_from(&local.$field);
                    }
                )+
            };
        }
        keep_local!(
            display_name,
            description,
            category,
            version,
            download_url,
            output_filename,
            referer,
            install_params,
            app_type,
            executable,
            compatible_os_arch,
            icon_url,
            icon_file,
        );

        if local.auto_install.is_some() {
            merged.auto_install = local.auto_install;
        }

        let mut extra = local.extra.clone();
        for (key, value) in &remote.extra {
            extra.insert(key.clone(), value.clone());
        }
        merged.extra = extra;

        merged
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    /// Free-form key-value settings
    #[serde(default)]
    pub settings: Map<String, Value>,
    /// Locally known apps keyed by app key
    #[serde(default)]
    pub app_items: BTreeMap<String, AppRecord>,
    /// `app_items` entries that did not decode, written back verbatim
    #[serde(skip)]
    pub undecoded_items: Map<String, Value>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ItemRef<'a> {
    Record(&'a AppRecord),
    Raw(&'a Value),
}

impl Serialize for AppConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // A decoded record replaces a raw entry stored under the same key
        let mut items: BTreeMap<&str, ItemRef<'_>> = self
            .undecoded_items
            .iter()
            .map(|(key, value)| (key.as_str(), ItemRef::Raw(value)))
            .collect();
        items.extend(
            self.app_items
                .iter()
                .map(|(key, record)| (key.as_str(), ItemRef::Record(record))),
        );

        let mut state = serializer.serialize_struct("AppConfig", 2)?;
        state.serialize_field("settings", &self.settings)?;
        state.serialize_field("app_items", &items)?;
        state.end()
    }
}

impl AppConfig {
    /// Build a configuration from an already parsed JSON document
    ///
    /// Never fails: a non-object document or `settings` value yields an empty
    /// map, and app entries that do not decode are set aside in
    /// `undecoded_items` with a warning.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut root) = value else {
            warn!("Configuration root is not a JSON object, using defaults");
            return Self::default();
        };

        let settings = match root.remove("settings") {
            Some(Value::Object(settings)) => settings,
            Some(other) => {
                warn!("Ignoring non-object settings value: {}", other);
                Map::new()
            }
            None => Map::new(),
        };

        let (app_items, undecoded_items) = root
            .remove("app_items")
            .map(|items| decode_entries(items, "configuration"))
            .unwrap_or_default();

        Self {
            settings,
            app_items,
            undecoded_items,
        }
    }

    /// App keys remembered as selected for installation
    pub fn selected_for_install(&self) -> Vec<String> {
        self.settings
            .get(SELECTED_FOR_INSTALL_KEY)
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remember the selection
    pub fn set_selected_for_install(&mut self, keys: &[String]) {
        self.settings.insert(
            SELECTED_FOR_INSTALL_KEY.to_string(),
            Value::from(keys.to_vec()),
        );
    }

    /// Unix timestamp of the last self-update check, 0 if never checked
    pub fn last_update_check(&self) -> u64 {
        self.settings
            .get(LAST_UPDATE_CHECK_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Record a self-update check
    pub fn set_last_update_check(&mut self, timestamp: u64) {
        self.settings
            .insert(LAST_UPDATE_CHECK_KEY.to_string(), Value::from(timestamp));
    }

    /// Parallel download override, ignored unless at least 1
    pub fn max_parallel_downloads(&self) -> Option<usize> {
        self.settings
            .get(MAX_PARALLEL_DOWNLOADS_KEY)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n >= 1)
    }
}

/// Decode an `app_items` object entry by entry
///
/// `origin` only labels log messages. Entries that do not decode are dropped.
pub fn decode_app_items(items: Value, origin: &str) -> BTreeMap<String, AppRecord> {
    decode_entries(items, origin).0
}

fn decode_entries(
    items: Value,
    origin: &str,
) -> (BTreeMap<String, AppRecord>, Map<String, Value>) {
    let Value::Object(items) = items else {
        warn!("{} app_items is not a JSON object, ignoring it", origin);
        return (BTreeMap::new(), Map::new());
    };

    let mut decoded = BTreeMap::new();
    let mut undecoded = Map::new();
    for (key, value) in items {
        match AppRecord::deserialize(&value) {
            Ok(record) => {
                decoded.insert(key, record);
            }
            Err(e) => {
                warn!("Skipping malformed {} entry '{}': {}", origin, key, e);
                undecoded.insert(key, value);
            }
        }
    }
    (decoded, undecoded)
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected a string, found {other}"))),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<bool>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(other) => Err(D::Error::custom(format!("expected a boolean, found {other}"))),
    }
}
