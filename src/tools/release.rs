//! GitHub release metadata and asset unpacking

use crate::error::{AisError, Result, StringError};
use crate::utils::http;
use serde::Deserialize;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Latest-release response from the GitHub API
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    /// Release tag, compared verbatim against the cached marker
    pub tag_name: String,
    /// Downloadable assets
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// One downloadable release asset
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    /// File name of the asset
    pub name: String,
    /// Direct download URL
    pub browser_download_url: String,
}

/// How to recognise the wanted asset among a release's assets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetMatcher {
    /// Exact file name
    Exact(&'static str),
    /// Name containing `keyword` and ending with `suffix`
    KeywordSuffix {
        /// Substring the name must contain
        keyword: &'static str,
        /// Required file extension, including the dot
        suffix: &'static str,
    },
}

impl AssetMatcher {
    /// Whether `name` is the wanted asset
    pub fn matches(self, name: &str) -> bool {
        match self {
            AssetMatcher::Exact(expected) => name == expected,
            AssetMatcher::KeywordSuffix { keyword, suffix } => {
                name.contains(keyword) && name.ends_with(suffix)
            }
        }
    }
}

impl GitHubRelease {
    /// First asset accepted by `matcher`
    pub fn find_asset(&self, matcher: AssetMatcher) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| matcher.matches(&asset.name))
    }
}

/// Fetch the latest release from a GitHub API URL
pub fn fetch_latest_release(api_url: &str) -> Result<GitHubRelease> {
    let client = http::client(http::REQUEST_TIMEOUT)?;
    let body = http::get_bytes(&client, api_url)?;
    let release: GitHubRelease = serde_json::from_slice(&body)?;
    debug!("Latest release at {} is {}", api_url, release.tag_name);
    Ok(release)
}

/// Replace the directory `dest` with one produced by `fill`
///
/// `fill` writes into an empty staging directory next to `dest`. Only when it
/// succeeds is the old `dest` moved aside and the staged one renamed into
/// place; on any failure `dest` is left exactly as it was.
pub fn replace_dir_with(dest: &Path, fill: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let parent = dest
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)?;
    fill(staging.path())?;

    if !dest.exists() {
        fs::rename(staging.keep(), dest)?;
        return Ok(());
    }

    // The previous contents live in a temp dir until the swap is done
    let previous = tempfile::Builder::new()
        .prefix(".previous-")
        .tempdir_in(parent)?;
    let backup = previous.path().join("contents");
    fs::rename(dest, &backup)?;

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, dest) {
        warn!("Could not move {} into place: {}", staged.display(), e);
        if let Err(restore) = fs::rename(&backup, dest) {
            warn!("Could not restore {}: {}", dest.display(), restore);
        }
        if let Err(cleanup) = fs::remove_dir_all(&staged) {
            debug!("Could not remove {}: {}", staged.display(), cleanup);
        }
        return Err(e.into());
    }

    debug!("Replaced {}", dest.display());
    Ok(())
}

/// Unpack a zip archive into the empty directory `dest`
///
/// Release archives usually wrap everything in one top-level folder
/// (`aria2-1.37.0-win-64bit-build1/aria2c.exe`); that folder is stripped so
/// the executable lands directly in `dest`.
pub fn unpack_zip_flatten(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut entries: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        let Some(path) = file.enclosed_name().map(Path::to_path_buf) else {
            return Err(AisError::ToolProvisioningError(StringError::new(format!(
                "Archive entry escapes the target directory: {}",
                file.name()
            ))));
        };
        entries.push((index, path, file.is_dir()));
    }

    let strip = common_root(entries.iter().map(|(_, path, _)| path.as_path()));
    fs::create_dir_all(dest)?;

    for (index, path, is_dir) in entries {
        let relative = match &strip {
            Some(root) => path.strip_prefix(root).unwrap_or(&path).to_path_buf(),
            None => path,
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&relative);
        if is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = archive.by_index(index)?;
        let mut contents = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut contents)?;
        fs::write(&target, contents)?;
    }

    Ok(())
}

/// The single top-level directory shared by every entry, if there is one
fn common_root<'a>(paths: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut root: Option<PathBuf> = None;
    let mut has_nested = false;

    for path in paths {
        let mut components = path.components();
        let first = match components.next() {
            Some(Component::Normal(first)) => PathBuf::from(first),
            _ => return None,
        };
        if components.next().is_some() {
            has_nested = true;
        }
        match &root {
            Some(existing) if *existing != first => return None,
            Some(_) => {}
            None => root = Some(first),
        }
    }

    root.filter(|_| has_nested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn release(names: &[&str]) -> GitHubRelease {
        GitHubRelease {
            tag_name: "release-1.37.0".to_string(),
            assets: names
                .iter()
                .map(|name| ReleaseAsset {
                    name: (*name).to_string(),
                    browser_download_url: format!("https://example/{name}"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_asset_matching() {
        let aria = release(&[
            "aria2-1.37.0-win-32bit-build1.zip",
            "aria2-1.37.0-win-64bit-build1.zip",
            "aria2-1.37.0.tar.xz",
        ]);
        let asset = aria
            .find_asset(AssetMatcher::KeywordSuffix {
                keyword: "win-64bit",
                suffix: ".zip",
            })
            .unwrap();
        assert_eq!(asset.name, "aria2-1.37.0-win-64bit-build1.zip");

        let sevenzip = release(&["7z2408-x64.exe", "7zr.exe", "7z2408-src.7z"]);
        assert_eq!(
            sevenzip.find_asset(AssetMatcher::Exact("7zr.exe")).unwrap().name,
            "7zr.exe"
        );
        assert!(sevenzip.find_asset(AssetMatcher::Exact("7za.exe")).is_none());
    }

    #[test]
    fn test_release_deserializes_from_api_shape() {
        let json = r#"{
            "tag_name": "release-1.37.0",
            "name": "aria2 1.37.0",
            "prerelease": false,
            "assets": [{"name": "a.zip", "browser_download_url": "https://x/a.zip", "size": 3}]
        }"#;
        let release: GitHubRelease = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "release-1.37.0");
        assert_eq!(release.assets.len(), 1);
    }

    fn extract(bytes: &[u8], dest: &Path) -> Result<()> {
        replace_dir_with(dest, |staging| unpack_zip_flatten(bytes, staging))
    }

    fn no_staging_left(parent: &Path) -> bool {
        fs::read_dir(parent)
            .unwrap()
            .filter_map(std::result::Result::ok)
            .all(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
    }

    #[test]
    fn test_extract_strips_single_top_level_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("aria2");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), b"old").unwrap();

        let bytes = build_zip(&[
            ("aria2-1.37.0-win-64bit-build1/aria2c.exe", b"MZ"),
            ("aria2-1.37.0-win-64bit-build1/README.html", b"<p>"),
        ]);
        extract(&bytes, &dest).unwrap();

        assert_eq!(fs::read(dest.join("aria2c.exe")).unwrap(), b"MZ");
        assert!(dest.join("README.html").is_file());
        assert!(!dest.join("stale.txt").exists());
        assert!(no_staging_left(dir.path()));
    }

    #[test]
    fn test_extract_keeps_flat_archives() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool");

        let bytes = build_zip(&[("aria2c.exe", b"MZ"), ("docs/NEWS", b"n")]);
        extract(&bytes, &dest).unwrap();

        assert!(dest.join("aria2c.exe").is_file());
        assert!(dest.join("docs").join("NEWS").is_file());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract(b"not a zip", &dir.path().join("x"));
        assert!(matches!(result, Err(AisError::ArchiveError(_))));
        assert!(!dir.path().join("x").exists());
    }

    #[test]
    fn test_failed_extract_leaves_existing_dir_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("aria2");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("aria2c.exe"), b"working build").unwrap();

        // Flip a byte of the stored payload so its checksum no longer matches
        let payload: &[u8] = b"new aria2c build payload";
        let mut bytes = build_zip(&[("aria2c.exe", b"MZ"), ("aria2c.dll", payload)]);
        let at = bytes
            .windows(payload.len())
            .position(|w| w == payload)
            .unwrap();
        bytes[at] ^= 0xff;

        assert!(extract(&bytes, &dest).is_err());
        assert_eq!(fs::read(dest.join("aria2c.exe")).unwrap(), b"working build");
        assert!(!dest.join("aria2c.dll").exists());
        assert!(no_staging_left(dir.path()));
    }

    #[test]
    fn test_fill_error_keeps_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("7z");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("7zr.exe"), b"MZ").unwrap();

        let result = replace_dir_with(&dest, |staging| {
            fs::write(staging.join("7zr.exe"), b"M")?;
            Err(AisError::ToolProvisioningError(StringError::new("truncated")))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(dest.join("7zr.exe")).unwrap(), b"MZ");
        assert!(no_staging_left(dir.path()));
    }
}
