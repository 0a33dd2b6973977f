//! Dotted version ordering
//!
//! Catalog versions are free-form ("3.0.18", "24.08", "1.2.3.4", "v2.1",
//! "1.0rc1") so they cannot go through `semver`. Segments are compared as
//! numbers, never as text, and trailing zero segments are insignificant:
//! "1.10" > "1.9" and "2.0" == "2.0.0".

use crate::config::AppRecord;
use std::cmp::Ordering;
use std::fmt;

/// Parsed dotted version
#[derive(Debug, Clone)]
pub struct AppVersion {
    /// Numeric release segments with trailing zeros removed
    release: Vec<u64>,
    /// Pre-release tag ("rc1", "beta"), sorts before the plain release
    pre: Option<String>,
}

impl AppVersion {
    /// Parse a version string; anything unparseable counts as version 0
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim().trim_start_matches(['v', 'V']);
        // Build metadata never affects precedence
        let without_build = trimmed.split('+').next().unwrap_or_default();
        let (core, tag) = match without_build.split_once('-') {
            Some((core, tag)) => (core, Some(tag)),
            None => (without_build, None),
        };

        let mut release = Vec::new();
        let mut pre = None;
        for segment in core.split('.') {
            let digits_end = segment
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(segment.len());
            let (digits, rest) = segment.split_at(digits_end);

            if digits.is_empty() {
                if !rest.is_empty() {
                    pre = Some(rest.to_ascii_lowercase());
                }
                break;
            }

            release.push(digits.parse::<u64>().unwrap_or(u64::MAX));
            if !rest.is_empty() {
                pre = Some(rest.trim_start_matches(['-', '_']).to_ascii_lowercase());
                break;
            }
        }

        if pre.is_none() {
            pre = tag
                .filter(|t| !t.is_empty())
                .map(str::to_ascii_lowercase);
        }

        while release.last() == Some(&0) {
            release.pop();
        }

        Self { release, pre }
    }

    /// Numeric segments, trailing zeros removed
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Whether this is a pre-release
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            let a = self.release.get(i).copied().unwrap_or(0);
            let b = other.release.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }

        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AppVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AppVersion {}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.release.is_empty() {
            write!(f, "0")?;
        } else {
            let parts: Vec<String> = self.release.iter().map(ToString::to_string).collect();
            write!(f, "{}", parts.join("."))?;
        }
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

/// Whether `remote` is strictly newer than `local`
pub fn is_newer(remote: &str, local: &str) -> bool {
    AppVersion::parse(remote) > AppVersion::parse(local)
}

/// Whether the remote catalog offers a newer version than the local record
///
/// Absent versions compare as "0".
pub fn needs_update(local: &AppRecord, remote: &AppRecord) -> bool {
    is_newer(remote.version_or_default(), local.version_or_default())
}
