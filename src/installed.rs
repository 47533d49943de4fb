//! Installed-application discovery.
//!
//! An installed app lives at `<scopeRoot>/apps/<name>/` with a `current`
//! directory link pointing at the active version directory. Resolution is an
//! explicit two-step: read the link target, then take its basename as the
//! version. A missing or broken link yields `None` for both, never an error.

use crate::manifest::InstallInfo;
use crate::paths::ScopePaths;
use crate::types::InstallScope;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One installed application in one scope.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    /// Application name (apps-directory entry name).
    pub name: String,
    /// Scope the app is installed under.
    pub scope: InstallScope,
    /// `<scopeRoot>/apps/<name>`
    pub install_dir: PathBuf,
    /// Resolved target of the `current` link, when resolvable.
    pub current_dir: Option<PathBuf>,
    /// Basename of `current_dir`; `None` exactly when `current_dir` is.
    pub version: Option<String>,
    /// Bucket recorded at install time, from the `install.json` sidecar.
    pub bucket: Option<String>,
    /// Hold marker from the `install.json` sidecar.
    pub held: bool,
    /// Modification time of the active version directory, unix millis.
    pub last_modified: Option<i64>,
}

/// Resolve the `current` link inside an app directory.
///
/// Returns the link target as an absolute path, or `None` when the link is
/// missing, unreadable, or points at nothing.
pub fn resolve_current(install_dir: &Path) -> Option<PathBuf> {
    let link = install_dir.join("current");
    let target = fs::read_link(&link).ok()?;
    let target = if target.is_absolute() {
        target
    } else {
        install_dir.join(target)
    };
    if target.is_dir() { Some(target) } else { None }
}

fn version_of(current_dir: &Path) -> Option<String> {
    current_dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

/// Modification time of a path as unix milliseconds.
pub(crate) fn mtime_millis(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_millis()).ok()
}

fn read_app(paths: &ScopePaths, install_dir: PathBuf, name: String) -> InstalledPackage {
    let current_dir = resolve_current(&install_dir);
    let version = current_dir.as_deref().and_then(version_of);
    let info = current_dir
        .as_deref()
        .and_then(|dir| InstallInfo::parse_file(&dir.join("install.json")));
    let last_modified = current_dir.as_deref().and_then(mtime_millis);

    InstalledPackage {
        name,
        scope: paths.scope,
        install_dir,
        version,
        bucket: info.as_ref().and_then(|i| i.bucket.clone()),
        held: info.as_ref().and_then(|i| i.hold).unwrap_or(false),
        last_modified,
        current_dir,
    }
}

/// Scan one scope's apps directory. Absent directory yields an empty list.
pub fn list_installed(paths: &ScopePaths) -> Vec<InstalledPackage> {
    let Ok(entries) = fs::read_dir(paths.apps()) else {
        return Vec::new();
    };

    let mut apps = Vec::new();
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
        apps.push(read_app(paths, dir.clone(), name.to_string()));
    }
    apps.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    apps
}

/// Scan all given scopes in order (user first).
pub fn list_installed_all(scopes: &[ScopePaths]) -> Vec<InstalledPackage> {
    scopes.iter().flat_map(list_installed).collect()
}

/// Maximum age of a memoized listing. Time-based invalidation is enough
/// only because the host process is short-lived per invocation.
const MEMO_TTL: Duration = Duration::from_secs(30);

/// TTL-memoized installed-app listing, owned by the orchestrator.
#[derive(Default)]
pub struct InstalledCache {
    slot: Mutex<Option<(Instant, Arc<Vec<InstalledPackage>>)>>,
}

impl InstalledCache {
    /// Return the memoized listing, rescanning when older than the TTL.
    pub fn get_or_scan(&self, scopes: &[ScopePaths]) -> Arc<Vec<InstalledPackage>> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((at, apps)) = slot.as_ref() {
            if at.elapsed() < MEMO_TTL {
                return Arc::clone(apps);
            }
        }
        let apps = Arc::new(list_installed_all(scopes));
        *slot = Some((Instant::now(), Arc::clone(&apps)));
        apps
    }

    /// Drop the memoized listing.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn link_dir(target: &Path, link: &Path) {
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, link).expect("symlink");
        #[cfg(windows)]
        std::os::windows::fs::symlink_dir(target, link).expect("symlink");
    }

    fn install_app(paths: &ScopePaths, name: &str, ver: &str, sidecar: Option<&str>) {
        let app_dir = paths.apps().join(name);
        let version_dir = app_dir.join(ver);
        fs::create_dir_all(&version_dir).expect("mkdir");
        fs::write(version_dir.join("manifest.json"), format!("{{\"version\": \"{ver}\"}}"))
            .expect("write");
        if let Some(raw) = sidecar {
            fs::write(version_dir.join("install.json"), raw).expect("write");
        }
        link_dir(&version_dir, &app_dir.join("current"));
    }

    #[test]
    fn test_current_resolves_to_version() {
        let tmp = TempDir::new().expect("tempdir");
        let paths = ScopePaths::at(InstallScope::User, tmp.path());
        install_app(&paths, "jq", "1.7.1", Some(r#"{"bucket": "main"}"#));

        let apps = list_installed(&paths);
        assert_eq!(apps.len(), 1);
        let app = &apps[0];
        assert_eq!(app.version.as_deref(), Some("1.7.1"));
        assert_eq!(app.bucket.as_deref(), Some("main"));
        assert!(!app.held);
        assert!(app.current_dir.as_deref().is_some_and(Path::is_dir));
    }

    #[test]
    fn test_broken_link_yields_none_for_both() {
        let tmp = TempDir::new().expect("tempdir");
        let paths = ScopePaths::at(InstallScope::User, tmp.path());
        let app_dir = paths.apps().join("ghost");
        fs::create_dir_all(&app_dir).expect("mkdir");
        link_dir(&app_dir.join("1.0.0"), &app_dir.join("current"));

        let apps = list_installed(&paths);
        assert_eq!(apps.len(), 1);
        assert!(apps[0].current_dir.is_none());
        assert!(apps[0].version.is_none());
    }

    #[test]
    fn test_missing_link_yields_none() {
        let tmp = TempDir::new().expect("tempdir");
        let paths = ScopePaths::at(InstallScope::User, tmp.path());
        fs::create_dir_all(paths.apps().join("bare").join("2.0")).expect("mkdir");

        let apps = list_installed(&paths);
        assert!(apps[0].current_dir.is_none());
        assert!(apps[0].version.is_none());
    }

    #[test]
    fn test_held_from_sidecar() {
        let tmp = TempDir::new().expect("tempdir");
        let paths = ScopePaths::at(InstallScope::User, tmp.path());
        install_app(&paths, "pinned", "3.1", Some(r#"{"bucket": "main", "hold": true}"#));
        assert!(list_installed(&paths)[0].held);
    }

    #[test]
    fn test_memo_serves_cached_listing() {
        let tmp = TempDir::new().expect("tempdir");
        let paths = ScopePaths::at(InstallScope::User, tmp.path());
        install_app(&paths, "jq", "1.7.1", None);

        let cache = InstalledCache::default();
        let scopes = [paths.clone()];
        let first = cache.get_or_scan(&scopes);
        assert_eq!(first.len(), 1);

        // New install is invisible until the TTL lapses or invalidation.
        install_app(&paths, "fd", "9.0", None);
        assert_eq!(cache.get_or_scan(&scopes).len(), 1);

        cache.invalidate();
        assert_eq!(cache.get_or_scan(&scopes).len(), 2);
    }
}
