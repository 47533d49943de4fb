//! Ordered manifest lookup across install locations and buckets.
//!
//! A query names a package (`jq`) or pins a bucket (`extras/jq`). The
//! result order is fixed: the installed manifest first (user scope before
//! global), then one entry per bucket across both scopes that defines the
//! name. Zero, one, or many results are all normal outcomes.

use crate::bucket::{self, BucketEntry};
use crate::installed::resolve_current;
use crate::manifest::ManifestRecord;
use crate::paths::ScopePaths;
use crate::types::InstallScope;
use std::path::PathBuf;

/// Where a located manifest came from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    /// The active installed version's own manifest copy.
    Installed {
        /// Scope the installation lives under.
        scope: InstallScope,
    },
    /// A bucket's manifest file.
    Bucket {
        /// Bucket name.
        bucket: String,
        /// Scope the bucket lives under.
        scope: InstallScope,
    },
}

/// One manifest found for a query.
#[derive(Debug, Clone)]
pub struct LocatedManifest {
    /// Package name the manifest was located for.
    pub name: String,
    /// Manifest file path.
    pub path: PathBuf,
    /// Where it came from.
    pub source: ManifestSource,
    /// The parsed manifest.
    pub record: ManifestRecord,
}

/// Split a query into an optional bucket qualifier and the package name.
pub fn parse_query(input: &str) -> (Option<&str>, &str) {
    match input.split_once('/') {
        Some((bucket, name)) if !bucket.is_empty() && !name.is_empty() => (Some(bucket), name),
        _ => (None, input),
    }
}

/// Locate every manifest for a query, in presentation order.
///
/// Unreadable or malformed manifests are skipped silently: bucket content
/// is untrusted input, not a fatal condition.
pub fn locate_all(input: &str, scopes: &[ScopePaths]) -> Vec<LocatedManifest> {
    let (bucket_filter, name) = parse_query(input);
    let mut found = Vec::new();

    // Installed copy first, user scope before global.
    for paths in scopes {
        let install_dir = paths.apps().join(name);
        let Some(current) = resolve_current(&install_dir) else {
            continue;
        };
        let path = current.join("manifest.json");
        let Some(record) = ManifestRecord::parse_file(&path) else {
            continue;
        };
        found.push(LocatedManifest {
            name: name.to_string(),
            path,
            source: ManifestSource::Installed { scope: paths.scope },
            record,
        });
    }

    for paths in scopes {
        for entry in bucket::list_buckets(paths) {
            if let Some(filter) = bucket_filter {
                if !entry.name.eq_ignore_ascii_case(filter) {
                    continue;
                }
            }
            if let Some(located) = locate_in_bucket(&entry, name) {
                found.push(located);
            }
        }
    }

    found
}

fn locate_in_bucket(entry: &BucketEntry, name: &str) -> Option<LocatedManifest> {
    let path = entry.manifest_path(name);
    if !path.is_file() {
        return None;
    }
    let record = ManifestRecord::parse_file(&path)?;
    Some(LocatedManifest {
        name: name.to_string(),
        path,
        source: ManifestSource::Bucket {
            bucket: entry.name.clone(),
            scope: entry.scope,
        },
        record,
    })
}
