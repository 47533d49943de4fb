//! Scope root resolution and well-known subdirectories.

use crate::types::InstallScope;
use dirs::home_dir;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving scope roots.
///
/// These are the only hard failures in the engine: everything downstream
/// of a resolved root degrades gracefully instead of erroring.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine home directory. Set LADLE_HOME to override.")]
    HomeNotResolved,
}

/// Returns the per-user root, or `None` if the user's home cannot be resolved.
pub fn try_user_root() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("LADLE_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".ladle"))
}

/// Returns the system-wide root.
///
/// Overridable via `LADLE_GLOBAL`; defaults to `%ProgramData%\ladle` on
/// Windows and a fixed system prefix elsewhere.
pub fn global_root() -> PathBuf {
    if let Ok(val) = std::env::var("LADLE_GLOBAL") {
        return PathBuf::from(val);
    }
    if cfg!(windows) {
        std::env::var("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(r"C:\ProgramData"))
            .join("ladle")
    } else {
        PathBuf::from("/var/lib/ladle")
    }
}

/// Location of the persisted search-index document.
///
/// Overridable via `LADLE_CACHE_DIR`; defaults to the user scope's cache
/// directory.
///
/// # Errors
///
/// Returns [`PathError::HomeNotResolved`] when no override is set and the
/// user's home directory cannot be determined.
pub fn cache_document_path() -> Result<PathBuf, PathError> {
    if let Ok(val) = std::env::var("LADLE_CACHE_DIR") {
        return Ok(PathBuf::from(val).join("search-index.json"));
    }
    try_user_root()
        .map(|root| root.join("cache").join("search-index.json"))
        .ok_or(PathError::HomeNotResolved)
}

/// Root directory and well-known subdirectories for one scope.
#[derive(Debug, Clone)]
pub struct ScopePaths {
    /// Scope this set of paths belongs to.
    pub scope: InstallScope,
    /// Scope root directory.
    pub root: PathBuf,
}

impl ScopePaths {
    /// Resolve the canonical paths for a scope from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::HomeNotResolved`] for the user scope when neither
    /// `LADLE_HOME` nor the home directory can be determined.
    pub fn resolve(scope: InstallScope) -> Result<Self, PathError> {
        let root = match scope {
            InstallScope::User => try_user_root().ok_or(PathError::HomeNotResolved)?,
            InstallScope::Global => global_root(),
        };
        Ok(Self { scope, root })
    }

    /// Build scope paths over an explicit root, bypassing the environment.
    pub fn at(scope: InstallScope, root: impl Into<PathBuf>) -> Self {
        Self {
            scope,
            root: root.into(),
        }
    }

    /// Installed applications: `<root>/apps`
    pub fn apps(&self) -> PathBuf {
        self.root.join("apps")
    }

    /// Shim executables: `<root>/shims`
    pub fn shims(&self) -> PathBuf {
        self.root.join("shims")
    }

    /// Bucket repositories: `<root>/buckets`
    pub fn buckets(&self) -> PathBuf {
        self.root.join("buckets")
    }

    /// Download cache: `<root>/cache`
    pub fn cache(&self) -> PathBuf {
        self.root.join("cache")
    }
}
