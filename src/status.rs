//! Per-app status evaluation.
//!
//! Each installed app is judged against the current bucket contents:
//! broken installs, holds, deprecations, removals, and available updates.
//! Evaluation is pure filesystem reading; it runs inside dispatcher
//! workers, so it takes everything it needs as arguments and touches no
//! shared state.

use crate::bucket::BucketEntry;
use crate::installed::InstalledPackage;
use crate::manifest::ManifestRecord;
use crate::types::InstallScope;
use crate::version;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Evaluated state of one installed app.
#[derive(Debug, Clone)]
pub struct AppStatus {
    /// Application name.
    pub name: String,
    /// Scope the app is installed under.
    pub scope: InstallScope,
    /// Installed version, when the `current` link resolved.
    pub installed_version: Option<String>,
    /// Best known version across buckets, when any bucket defines the app.
    pub latest_version: Option<String>,
    /// Bucket consulted for `latest_version`.
    pub bucket: Option<String>,
    /// The `current` link target is missing or the version is unresolvable.
    pub failed: bool,
    /// An `install.json` sidecar marks the app held.
    pub held: bool,
    /// The defining manifest is deprecated (path or marker field).
    pub deprecated: bool,
    /// No bucket defines the name anymore.
    pub removed: bool,
    /// Installed version is older than the best known version.
    pub outdated: bool,
}

impl AppStatus {
    /// True when the app has anything worth reporting.
    pub fn notable(&self) -> bool {
        self.failed || self.held || self.deprecated || self.removed || self.outdated
    }
}

/// A candidate manifest defining the app in one bucket.
struct Candidate {
    bucket: String,
    path: PathBuf,
    version: Option<String>,
    deprecated_marker: bool,
}

fn path_mentions_deprecated(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.to_lowercase().contains("deprecated"))
    })
}

/// Evaluate one installed app against the full bucket listing.
pub fn evaluate(app: &InstalledPackage, buckets: &[BucketEntry]) -> AppStatus {
    let failed = app.current_dir.is_none() || app.version.is_none();

    let mut candidates: Vec<Candidate> = Vec::new();
    for bucket in buckets {
        let path = bucket.manifest_path(&app.name);
        if !path.is_file() {
            continue;
        }
        let Some(record) = ManifestRecord::parse_file(&path) else {
            continue;
        };
        candidates.push(Candidate {
            bucket: bucket.name.clone(),
            version: record.version(),
            deprecated_marker: record.is_deprecated(),
            path,
        });
    }

    let removed = candidates.is_empty();

    // Prefer the bucket recorded at install time; fall back to whichever
    // bucket carries the highest version.
    let chosen = app
        .bucket
        .as_deref()
        .and_then(|origin| {
            candidates
                .iter()
                .find(|c| c.bucket.eq_ignore_ascii_case(origin))
        })
        .or_else(|| {
            candidates.iter().max_by(|a, b| {
                match (&a.version, &b.version) {
                    (Some(va), Some(vb)) => version::compare(va, vb),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                }
            })
        });

    let latest_version = chosen.and_then(|c| c.version.clone());
    let deprecated = chosen.is_some_and(|c| {
        c.deprecated_marker || path_mentions_deprecated(&c.path)
    });

    let outdated = match (&app.version, &latest_version) {
        (Some(installed), Some(latest)) => version::is_newer(installed, latest),
        _ => false,
    };

    AppStatus {
        name: app.name.clone(),
        scope: app.scope,
        installed_version: app.version.clone(),
        latest_version,
        bucket: chosen
            .map(|c| c.bucket.clone())
            .or_else(|| app.bucket.clone()),
        failed,
        held: app.held,
        deprecated,
        removed,
        outdated,
    }
}
