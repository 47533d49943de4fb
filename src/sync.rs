//! Repository synchronization seam.
//!
//! Bucket add/update flows need git, but the engine itself never shells
//! out; it consumes this capability through a trait so the subprocess
//! detail stays with the caller and tests can substitute a fake.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Capability to sync bucket repositories with their remotes.
#[async_trait]
pub trait RepoSync: Send + Sync {
    /// Clone `url` into `dest`.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// Whether `dir` is a repository this syncer can operate on.
    async fn is_repo(&self, dir: &Path) -> bool;

    /// Fetch remote refs without touching the working tree.
    async fn fetch(&self, dir: &Path) -> Result<()>;

    /// Bring the working tree up to date with the remote.
    async fn pull(&self, dir: &Path) -> Result<()>;

    /// Subject lines of commits the remote has that the local tree lacks.
    async fn commits_since_remote(&self, dir: &Path) -> Result<Vec<String>>;
}
