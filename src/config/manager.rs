//! Configuration store for loading and saving `app_config.json`
//!
//! Loading fails soft: a missing, empty or corrupt file yields the default
//! document. Saving writes a temporary file next to the target and persists
//! it over the old one so a crash never leaves half a document behind.
//!
//! All read-modify-write cycles go through [`ConfigStore::update`], which
//! holds one mutex across load, mutation and save. Worker threads finishing
//! at the same time therefore cannot lose each other's updates.

use crate::config::models::{AppConfig, AppRecord};
use crate::config::paths::{AppPaths, DEFAULT_ICON_FILE};
use crate::error::{AisError, Result};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Changes made by [`ConfigStore::heal`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealReport {
    /// Entries removed because their app directory no longer exists
    pub pruned: Vec<String>,
    /// Entries whose icon was missing and now point at the default icon
    pub icons_reset: Vec<String>,
}

impl HealReport {
    /// Whether the scan changed anything
    pub fn is_empty(&self) -> bool {
        self.pruned.is_empty() && self.icons_reset.is_empty()
    }
}

/// Configuration store bound to one config file
#[derive(Debug)]
pub struct ConfigStore {
    /// Path to `app_config.json`
    path: PathBuf,
    /// Serializes read-modify-write cycles
    commit_lock: Mutex<()>,
}

impl ConfigStore {
    /// Create a store for the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            commit_lock: Mutex::new(()),
        }
    }

    /// Create a store for the config file of an installation layout
    pub fn for_paths(paths: &AppPaths) -> Self {
        Self::new(paths.config_file.clone())
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, is empty or is corrupt,
    /// returns the default configuration. Never returns an error.
    pub fn load(&self) -> AppConfig {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Configuration file not found, using defaults");
                return AppConfig::default();
            }
            Err(e) => {
                warn!("Failed to read configuration, using defaults: {}", e);
                return AppConfig::default();
            }
        };

        if json.trim().is_empty() {
            info!("Configuration file is empty, using defaults");
            return AppConfig::default();
        }

        match serde_json::from_str(&json) {
            Ok(value) => {
                let config = AppConfig::from_value(value);
                debug!(
                    "Configuration loaded with {} app items",
                    config.app_items.len()
                );
                config
            }
            Err(e) => {
                warn!("Failed to parse configuration, using defaults: {}", e);
                AppConfig::default()
            }
        }
    }

    /// Save configuration to disk with atomic write
    ///
    /// Pretty-printed UTF-8 with non-ASCII text written as-is.
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let config_dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(config_dir)?;

        let json = serde_json::to_string_pretty(config)?;

        let mut temp = tempfile::NamedTempFile::new_in(config_dir)?;
        temp.write_all(json.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|e| AisError::ConfigError(Box::new(e.error)))?;

        debug!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    /// Load, mutate and save under the store's lock
    ///
    /// Returns the closure's result together with the document as written.
    pub fn update<T>(&self, mutate: impl FnOnce(&mut AppConfig) -> T) -> Result<(T, AppConfig)> {
        let _guard = self.commit_lock.lock();
        let mut config = self.load();
        let result = mutate(&mut config);
        self.save(&config)?;
        Ok((result, config))
    }

    /// Merge a remote record into `app_items[app_key]` and persist it
    ///
    /// `icon_file` is the icon actually obtained for this run. Returns the
    /// merged record as stored.
    pub fn commit_app(
        &self,
        app_key: &str,
        remote: &AppRecord,
        icon_file: &str,
    ) -> Result<AppRecord> {
        let (record, _) = self.update(|config| {
            let mut merged = AppRecord::merged_with_remote(config.app_items.get(app_key), remote);
            merged.icon_file = Some(icon_file.to_string());
            config
                .app_items
                .insert(app_key.to_string(), merged.clone());
            merged
        })?;

        info!(
            "Committed {} (version {}) to configuration",
            app_key,
            record.version_or_default()
        );
        Ok(record)
    }

    /// Set the `auto_install` preference of a locally known app
    pub fn set_auto_install(&self, app_key: &str, enabled: bool) -> Result<()> {
        let (found, _) = self.update(|config| match config.app_items.get_mut(app_key) {
            Some(record) => {
                record.auto_install = Some(enabled);
                true
            }
            None => false,
        })?;

        if found {
            info!("Set auto_install={} for {}", enabled, app_key);
            Ok(())
        } else {
            Err(AisError::UnknownApp(app_key.to_string()))
        }
    }

    /// Drop entries whose files vanished and repair dangling icon references
    ///
    /// An entry is pruned when `Apps/<app_key>` no longer exists. An entry
    /// whose `icon_file` exists neither in its app directory nor in the shared
    /// images directory is pointed back at the default icon.
    pub fn heal(&self, paths: &AppPaths) -> Result<HealReport> {
        let (report, _) = self.update(|config| {
            let mut report = HealReport::default();

            config.app_items.retain(|key, _| {
                let keep = paths.app_dir(key).is_dir();
                if !keep {
                    report.pruned.push(key.clone());
                }
                keep
            });

            for (key, record) in &mut config.app_items {
                let Some(icon) = record.icon_file.as_deref() else {
                    continue;
                };
                if icon == DEFAULT_ICON_FILE {
                    continue;
                }
                let present =
                    paths.app_dir(key).join(icon).is_file() || paths.images_dir.join(icon).is_file();
                if !present {
                    record.icon_file = Some(DEFAULT_ICON_FILE.to_string());
                    report.icons_reset.push(key.clone());
                }
            }

            report
        })?;

        if !report.is_empty() {
            info!(
                "Configuration healed: {} pruned, {} icons reset",
                report.pruned.len(),
                report.icons_reset.len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("app_config.json"))
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.load(), AppConfig::default());
    }

    #[test]
    fn test_load_corrupt_or_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        std::fs::write(store.path(), "").unwrap();
        assert_eq!(store.load(), AppConfig::default());

        std::fs::write(store.path(), "{ not json").unwrap();
        assert_eq!(store.load(), AppConfig::default());
    }

    #[test]
    fn test_save_is_pretty_and_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut config = AppConfig::default();
        config.app_items.insert(
            "unikey".to_string(),
            AppRecord {
                display_name: Some("Bộ gõ tiếng Việt".to_string()),
                ..AppRecord::default()
            },
        );
        store.save(&config).unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("Bộ gõ tiếng Việt"));
        assert!(text.contains("\n  "));
        assert_eq!(store.load(), config);
    }

    #[test]
    fn test_save_load_round_trip_preserves_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let document = json!({
            "settings": {"selected_for_install": ["vlc"], "theme": "dark"},
            "app_items": {
                "vlc": {
                    "display_name": "VLC",
                    "version": "3.0.18",
                    "type": "installer",
                    "install_params": "/S",
                    "custom": {"nested": true}
                }
            }
        });
        std::fs::write(store.path(), document.to_string()).unwrap();

        store.save(&store.load()).unwrap();

        let reread: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(reread, document);
    }

    #[test]
    fn test_save_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the persist step fail
        let target = dir.path().join("app_config.json");
        std::fs::create_dir_all(target.join("occupied")).unwrap();
        let store = ConfigStore::new(&target);

        assert!(store.save(&AppConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_enum_values_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let document = json!({
            "settings": {},
            "app_items": {
                "x": {"type": "msi", "compatible_os_arch": "arm64", "version": "1"}
            }
        });
        std::fs::write(store.path(), document.to_string()).unwrap();

        store.save(&store.load()).unwrap();

        let reread: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(reread, document);
    }

    #[test]
    fn test_commit_keeps_entries_that_do_not_decode() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let broken = json!({"version": {"major": 1}, "display_name": "Legacy"});
        std::fs::write(
            store.path(),
            json!({
                "settings": {},
                "app_items": {
                    "old": {"version": 24.08, "auto_install": "true"},
                    "broken": broken.clone()
                }
            })
            .to_string(),
        )
        .unwrap();

        let remote = AppRecord {
            version: Some("3.0.20".to_string()),
            ..AppRecord::default()
        };
        store.commit_app("vlc", &remote, "vlc.png").unwrap();
        store.set_auto_install("vlc", true).unwrap();

        let reread: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let items = &reread["app_items"];
        assert_eq!(items["broken"], broken);
        assert_eq!(items["old"]["version"], "24.08");
        assert_eq!(items["old"]["auto_install"], true);
        assert_eq!(items["vlc"]["version"], "3.0.20");

        let loaded = store.load();
        assert!(loaded.app_items["old"].is_auto_install());
        assert!(loaded.undecoded_items.contains_key("broken"));
    }

    #[test]
    fn test_commit_app_merges_and_sets_icon() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut config = AppConfig::default();
        config.app_items.insert(
            "vlc".to_string(),
            AppRecord {
                version: Some("3.0.17".to_string()),
                auto_install: Some(true),
                ..AppRecord::default()
            },
        );
        store.save(&config).unwrap();

        let remote = AppRecord {
            version: Some("3.0.18".to_string()),
            display_name: Some("VLC".to_string()),
            ..AppRecord::default()
        };
        let record = store.commit_app("vlc", &remote, "vlc.png").unwrap();

        assert_eq!(record.version.as_deref(), Some("3.0.18"));
        assert_eq!(record.auto_install, Some(true));
        assert_eq!(record.icon_file.as_deref(), Some("vlc.png"));
        assert_eq!(store.load().app_items["vlc"], record);
    }

    #[test]
    fn test_concurrent_commits_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let remote = AppRecord {
                        version: Some(format!("1.{i}")),
                        ..AppRecord::default()
                    };
                    store
                        .commit_app(&format!("app{i}"), &remote, DEFAULT_ICON_FILE)
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load().app_items.len(), 8);
    }

    #[test]
    fn test_set_auto_install() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .commit_app("vlc", &AppRecord::default(), DEFAULT_ICON_FILE)
            .unwrap();

        store.set_auto_install("vlc", true).unwrap();
        assert!(store.load().app_items["vlc"].is_auto_install());

        let err = store.set_auto_install("missing", true).unwrap_err();
        assert!(matches!(err, AisError::UnknownApp(key) if key == "missing"));
    }

    #[test]
    fn test_heal_prunes_and_resets_icons() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_base(dir.path());
        paths.ensure_dirs().unwrap();
        let store = ConfigStore::for_paths(&paths);

        std::fs::create_dir_all(paths.app_dir("kept")).unwrap();
        std::fs::write(paths.app_dir("kept").join("kept.png"), b"png").unwrap();
        std::fs::create_dir_all(paths.app_dir("no_icon")).unwrap();

        let mut config = AppConfig::default();
        for (key, icon) in [
            ("kept", "kept.png"),
            ("no_icon", "no_icon.png"),
            ("gone", "gone.png"),
        ] {
            config.app_items.insert(
                key.to_string(),
                AppRecord {
                    icon_file: Some(icon.to_string()),
                    ..AppRecord::default()
                },
            );
        }
        store.save(&config).unwrap();

        let report = store.heal(&paths).unwrap();

        assert_eq!(report.pruned, vec!["gone"]);
        assert_eq!(report.icons_reset, vec!["no_icon"]);
        let healed = store.load();
        assert_eq!(healed.app_items.len(), 2);
        assert_eq!(healed.app_items["kept"].icon_file.as_deref(), Some("kept.png"));
        assert_eq!(
            healed.app_items["no_icon"].icon_file.as_deref(),
            Some(DEFAULT_ICON_FILE)
        );
    }
}
