//! Bucket enumeration and manifest-file listing.
//!
//! A bucket is a synced repository of per-package `<name>.json` manifests.
//! Two layout conventions exist in the wild: manifests at the bucket root,
//! or nested under a `bucket/` subdirectory. The registry probes for the
//! nested layout first and falls back to the root.

use crate::paths::ScopePaths;
use crate::types::{BucketKey, InstallScope};
use std::fs;
use std::path::{Path, PathBuf};

/// One bucket directory under a scope's bucket root.
#[derive(Debug, Clone)]
pub struct BucketEntry {
    /// Bucket directory name.
    pub name: String,
    /// Scope the bucket lives under.
    pub scope: InstallScope,
    /// Bucket repository root (not the manifest directory).
    pub dir: PathBuf,
    /// Origin URL read from the repository config, when present.
    pub remote: Option<String>,
}

impl BucketEntry {
    /// Unique key for this bucket.
    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.scope, self.name.clone())
    }

    /// Directory that actually holds the `<name>.json` manifests.
    ///
    /// Prefers a nested `bucket/` subdirectory when it contains any `.json`
    /// file, else the repository root.
    pub fn manifest_dir(&self) -> PathBuf {
        let nested = self.dir.join("bucket");
        if dir_has_json(&nested) {
            nested
        } else {
            self.dir.clone()
        }
    }

    /// Path where a manifest for `name` would live in this bucket.
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.manifest_dir().join(format!("{name}.json"))
    }
}

fn dir_has_json(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .any(|e| e.path().extension().is_some_and(|ext| ext == "json"))
}

/// List bucket directories under a scope's bucket root, sorted by name.
///
/// An absent bucket root yields an empty list, not an error.
pub fn list_buckets(paths: &ScopePaths) -> Vec<BucketEntry> {
    let root = paths.buckets();
    let Ok(entries) = fs::read_dir(&root) else {
        return Vec::new();
    };

    let mut buckets = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        buckets.push(BucketEntry {
            name: name.to_string(),
            scope: paths.scope,
            remote: read_git_remote(&dir),
            dir,
        });
    }
    buckets.sort_by(|a, b| a.name.cmp(&b.name));
    buckets
}

/// List the manifest files in a bucket, sorted by file name.
///
/// Dotfiles and non-`.json` entries are skipped.
pub fn manifest_files(bucket: &BucketEntry) -> Vec<PathBuf> {
    list_manifest_files(&bucket.manifest_dir())
}

/// List the `.json` manifests directly inside `dir`, sorted by file name.
pub fn list_manifest_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "json")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'))
        })
        .collect();
    files.sort();
    files
}

/// Read the origin URL from a bucket's `.git/config`, if any.
///
/// Plain text scan; repository sync itself lives behind [`crate::sync::RepoSync`]
/// and is never invoked from here.
fn read_git_remote(dir: &Path) -> Option<String> {
    let config = fs::read_to_string(dir.join(".git").join("config")).ok()?;
    let mut in_remote = false;
    for line in config.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_remote = line.starts_with("[remote");
            continue;
        }
        if !in_remote {
            continue;
        }
        if let Some(rest) = line.strip_prefix("url") {
            if let Some(url) = rest.trim_start().strip_prefix('=') {
                return Some(url.trim().to_string());
            }
        }
    }
    None
}
