//! App icon download and normalisation
//!
//! Icons come from arbitrary URLs in whatever format the vendor publishes
//! (PNG, ICO, JPEG). Each one is decoded, resized to 32x32 with Lanczos3 and
//! stored as `Apps/<app_key>/<app_key>.png`. Any failure falls back to the
//! shared `default.png`.

use crate::config::AppPaths;
use crate::config::paths::DEFAULT_ICON_FILE;
use crate::error::Result;
use crate::utils::http;
use image::{ImageFormat, ImageReader, Rgba, RgbaImage, imageops::FilterType};
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Edge length of stored icons in pixels
pub const ICON_SIZE: u32 = 32;

/// Fetches raw icon bytes
pub trait IconFetcher: Send + Sync {
    /// Download the bytes behind `url`
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`IconFetcher`] using a blocking HTTP client
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpIconFetcher;

impl IconFetcher for HttpIconFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let client = http::client(http::REQUEST_TIMEOUT)?;
        http::get_bytes(&client, url)
    }
}

/// Decode `bytes` in any supported format and return a 32x32 PNG
pub fn normalize_icon(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    let resized = img.resize_exact(ICON_SIZE, ICON_SIZE, FilterType::Lanczos3);

    // Typical 32x32 PNGs are 2-6 KB
    let mut png = Vec::with_capacity(8192);
    resized
        .to_rgba8()
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Write `contents` to `path` through a temporary file in the same directory
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Fetch and store the icon for `app_key`, returning the `icon_file` value
///
/// Returns `"<app_key>.png"` on success and `"default.png"` when there is no
/// URL or the icon cannot be fetched or decoded.
pub fn cache_icon(
    fetcher: &dyn IconFetcher,
    paths: &AppPaths,
    app_key: &str,
    icon_url: Option<&str>,
) -> String {
    let Some(url) = icon_url.filter(|u| !u.trim().is_empty()) else {
        debug!("{} has no icon URL, using default icon", app_key);
        return DEFAULT_ICON_FILE.to_string();
    };

    let file_name = format!("{app_key}.png");
    let target = paths.app_dir(app_key).join(&file_name);

    let stored = fetcher
        .fetch(url)
        .and_then(|bytes| normalize_icon(&bytes))
        .and_then(|png| write_atomic(&target, &png));

    match stored {
        Ok(()) => {
            debug!("Stored icon for {} at {}", app_key, target.display());
            file_name
        }
        Err(e) => {
            warn!("Icon for {} unavailable, using default: {}", app_key, e);
            DEFAULT_ICON_FILE.to_string()
        }
    }
}

/// Create `Images/default.png` if it does not exist yet
pub fn ensure_default_icon(paths: &AppPaths) -> Result<()> {
    let path = paths.default_icon();
    if path.is_file() {
        return Ok(());
    }

    let img = RgbaImage::from_pixel(ICON_SIZE, ICON_SIZE, Rgba([0x80, 0x80, 0x80, 0xff]));
    let mut png = Vec::with_capacity(512);
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    write_atomic(&path, &png)
}
