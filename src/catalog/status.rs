//! Catalog view: effective catalog, per-app status and search
//!
//! The effective catalog is the remote one when it could be fetched and the
//! local `app_items` otherwise. Status is always verified against the
//! filesystem, since a config entry alone does not prove the file exists.

use crate::catalog::Catalog;
use crate::catalog::version::needs_update;
use crate::config::paths::is_single_component;
use crate::config::{AppConfig, AppPaths, AppRecord, OsArch};
use std::path::{Path, PathBuf};

/// Where the effective catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOrigin {
    /// Fetched from the remote catalog
    Remote,
    /// Remote catalog unavailable, local `app_items` used instead
    Local,
}

/// Status of one catalog entry relative to local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    /// Neither downloaded nor known locally
    NotDownloaded,
    /// Known locally with an older version than the catalog
    UpdateAvailable,
    /// Downloaded or known, and current
    Available,
}

impl AppStatus {
    /// Short label for listings
    pub fn label(self) -> &'static str {
        match self {
            AppStatus::NotDownloaded => "not downloaded",
            AppStatus::UpdateAvailable => "update available",
            AppStatus::Available => "available",
        }
    }
}

/// One category of search results
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    /// Category name
    pub category: String,
    /// Entries sorted by display name
    pub apps: Vec<(String, AppRecord)>,
}

/// Pick the remote catalog when available, otherwise the local app items
pub fn effective_catalog(remote: Option<Catalog>, local: &AppConfig) -> (Catalog, CatalogOrigin) {
    match remote {
        Some(catalog) => (catalog, CatalogOrigin::Remote),
        None => (local.app_items.clone(), CatalogOrigin::Local),
    }
}

/// Drop entries that cannot run on `system`
pub fn filter_compatible(catalog: Catalog, system: OsArch) -> Catalog {
    catalog
        .into_iter()
        .filter(|(_, record)| record.arch().supports(&system))
        .collect()
}

/// Where the download of `app_key` is stored
///
/// `<AppsDir>/<app_key>/<output_filename or basename(download_url)>`, or
/// `None` when the key or the file name is not a single path component.
pub fn download_path(paths: &AppPaths, app_key: &str, record: &AppRecord) -> Option<PathBuf> {
    if !is_single_component(app_key) {
        return None;
    }
    record
        .file_name()
        .map(|name| paths.app_dir(app_key).join(name))
}

/// Whether a download finished
///
/// aria2c keeps a `<file>.aria2` control file next to unfinished downloads.
pub fn is_download_complete(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let mut control = path.as_os_str().to_owned();
    control.push(".aria2");
    !Path::new(&control).exists()
}

/// Status of `app_key` given the catalog record and local state
pub fn app_status(
    paths: &AppPaths,
    config: &AppConfig,
    app_key: &str,
    catalog_record: &AppRecord,
) -> AppStatus {
    let local = config.app_items.get(app_key);
    let on_disk = paths.app_dir(app_key).is_dir();

    match local {
        None if !on_disk => AppStatus::NotDownloaded,
        Some(local) if needs_update(local, catalog_record) => AppStatus::UpdateAvailable,
        _ => AppStatus::Available,
    }
}

/// Filter by a case-insensitive query and group by category
///
/// Queries shorter than two characters match everything. Categories are
/// sorted alphabetically and entries by display name.
pub fn search(catalog: &Catalog, query: &str) -> Vec<CategoryGroup> {
    let needle = query.trim().to_lowercase();
    let filtering = needle.chars().count() >= 2;

    let mut groups: Vec<CategoryGroup> = Vec::new();
    for (key, record) in catalog {
        if filtering {
            let haystacks = [
                record.display_name.as_deref().unwrap_or(key),
                record.description.as_deref().unwrap_or_default(),
                record.category.as_deref().unwrap_or_default(),
            ];
            if !haystacks
                .iter()
                .any(|text| text.to_lowercase().contains(&needle))
            {
                continue;
            }
        }

        let category = record.category_or_default();
        match groups.iter_mut().find(|group| group.category == category) {
            Some(group) => group.apps.push((key.clone(), record.clone())),
            None => groups.push(CategoryGroup {
                category: category.to_string(),
                apps: vec![(key.clone(), record.clone())],
            }),
        }
    }

    groups.sort_by(|a, b| a.category.cmp(&b.category));
    for group in &mut groups {
        group.apps.sort_by(|(ka, a), (kb, b)| {
            a.display_name_or(ka)
                .to_lowercase()
                .cmp(&b.display_name_or(kb).to_lowercase())
        });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, category: &str, version: &str) -> AppRecord {
        AppRecord {
            display_name: Some(name.to_string()),
            category: Some(category.to_string()),
            version: Some(version.to_string()),
            download_url: Some(format!("https://example/{}.exe", name.to_lowercase())),
            ..AppRecord::default()
        }
    }

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert("vlc".to_string(), app("VLC", "Media", "3.0.18"));
        catalog.insert("mpc".to_string(), app("MPC-HC", "Media", "2.1"));
        catalog.insert("7zip".to_string(), app("7-Zip", "Utilities", "24.08"));
        catalog
    }

    #[test]
    fn test_offline_fallback_equals_local_items() {
        let mut local = AppConfig::default();
        local
            .app_items
            .insert("vlc".to_string(), app("VLC", "Media", "3.0.18"));

        let (catalog, origin) = effective_catalog(None, &local);
        assert_eq!(origin, CatalogOrigin::Local);
        assert_eq!(catalog, local.app_items);

        let (catalog, origin) = effective_catalog(Some(sample_catalog()), &local);
        assert_eq!(origin, CatalogOrigin::Remote);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_filter_compatible() {
        let mut catalog = sample_catalog();
        catalog.get_mut("mpc").unwrap().compatible_os_arch = Some(OsArch::Bit64);

        let filtered = filter_compatible(catalog.clone(), OsArch::Bit32);
        assert!(!filtered.contains_key("mpc"));
        assert_eq!(filtered.len(), 2);

        let filtered = filter_compatible(catalog, OsArch::Bit64);
        assert_eq!(filtered.len(), 3);
    }

    #[test]
    fn test_download_completion_detection() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("vlc.exe");
        assert!(!is_download_complete(&file));

        std::fs::write(&file, b"MZ").unwrap();
        std::fs::write(dir.path().join("vlc.exe.aria2"), b"").unwrap();
        assert!(!is_download_complete(&file));

        std::fs::remove_file(dir.path().join("vlc.exe.aria2")).unwrap();
        assert!(is_download_complete(&file));
    }

    #[test]
    fn test_app_status() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_base(dir.path());
        paths.ensure_dirs().unwrap();
        let remote = app("VLC", "Media", "3.0.18");

        let mut config = AppConfig::default();
        assert_eq!(
            app_status(&paths, &config, "vlc", &remote),
            AppStatus::NotDownloaded
        );

        std::fs::create_dir_all(paths.app_dir("vlc")).unwrap();
        assert_eq!(
            app_status(&paths, &config, "vlc", &remote),
            AppStatus::Available
        );

        config
            .app_items
            .insert("vlc".to_string(), app("VLC", "Media", "3.0.17"));
        assert_eq!(
            app_status(&paths, &config, "vlc", &remote),
            AppStatus::UpdateAvailable
        );
    }

    #[test]
    fn test_search_groups_and_sorts() {
        let catalog = sample_catalog();

        let groups = search(&catalog, "");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category, "Media");
        let names: Vec<&str> = groups[0]
            .apps
            .iter()
            .map(|(k, r)| r.display_name_or(k))
            .collect();
        assert_eq!(names, vec!["MPC-HC", "VLC"]);

        // One character does not filter
        assert_eq!(search(&catalog, "z").len(), 2);

        let groups = search(&catalog, "ZI");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].apps[0].0, "7zip");

        let groups = search(&catalog, "util");
        assert_eq!(groups[0].category, "Utilities");
    }

    #[test]
    fn test_download_path() {
        let paths = AppPaths::from_base("base");
        let record = app("VLC", "Media", "3.0.18");
        assert_eq!(
            download_path(&paths, "vlc", &record),
            Some(paths.app_dir("vlc").join("vlc.exe"))
        );
    }

    #[test]
    fn test_download_path_stays_inside_app_dir() {
        let paths = AppPaths::from_base("base");
        let mut record = app("VLC", "Media", "3.0.18");

        record.output_filename = Some("../../evil.exe".to_string());
        assert_eq!(download_path(&paths, "vlc", &record), None);

        record.output_filename = Some("vlc-setup.exe".to_string());
        assert_eq!(download_path(&paths, "../Tools", &record), None);
        assert_eq!(download_path(&paths, "a/b", &record), None);
        assert_eq!(download_path(&paths, "", &record), None);
        assert_eq!(
            download_path(&paths, "vlc", &record),
            Some(paths.apps_dir.join("vlc").join("vlc-setup.exe"))
        );
    }
}
