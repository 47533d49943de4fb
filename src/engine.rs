//! Orchestrator facade.
//!
//! Single-threaded control flow over the whole engine: it owns the
//! persistent cache exclusively, memoizes the installed listing, and
//! delegates real parallelism to dispatcher worker waves. Command layers
//! call this; nothing here touches argv or the terminal.

use crate::bucket::{self, BucketEntry};
use crate::dispatch::{self, DispatchConfig, SearchJob, SearchMatch};
use crate::index::{CacheError, PackageIndex, PackageIndexEntry, SearchOptions};
use crate::installed::{InstalledCache, InstalledPackage};
use crate::locate::{self, LocatedManifest};
use crate::paths::{self, PathError, ScopePaths};
use crate::progress::ProgressSink;
use crate::status::AppStatus;
use crate::sync::RepoSync;
use crate::types::InstallScope;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// The package-metadata engine for one user environment.
pub struct Engine {
    scopes: Vec<ScopePaths>,
    index: PackageIndex,
    installed: InstalledCache,
    config: DispatchConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine over the environment-resolved scope roots.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::HomeNotResolved`] when the user's home cannot
    /// be determined — the engine's only fatal configuration error.
    pub fn new() -> Result<Self, PathError> {
        let scopes = vec![
            ScopePaths::resolve(InstallScope::User)?,
            ScopePaths::resolve(InstallScope::Global)?,
        ];
        let index = PackageIndex::open(paths::cache_document_path()?);
        Ok(Self::from_parts(scopes, index))
    }

    /// Build an engine over explicit roots and cache location. Used by
    /// embedders and tests that manage their own directories.
    pub fn with_roots(scopes: Vec<ScopePaths>, cache_path: PathBuf) -> Self {
        Self::from_parts(scopes, PackageIndex::open(cache_path))
    }

    fn from_parts(scopes: Vec<ScopePaths>, index: PackageIndex) -> Self {
        Self {
            scopes,
            index,
            installed: InstalledCache::default(),
            config: DispatchConfig::default(),
        }
    }

    /// Replace the dispatcher configuration.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Scope roots in lookup order (user first).
    pub fn scopes(&self) -> &[ScopePaths] {
        &self.scopes
    }

    /// Every bucket across both scopes.
    pub fn buckets(&self) -> Vec<BucketEntry> {
        self.scopes.iter().flat_map(bucket::list_buckets).collect()
    }

    /// The memoized installed-app listing across both scopes.
    pub fn installed(&self) -> Arc<Vec<InstalledPackage>> {
        self.installed.get_or_scan(&self.scopes)
    }

    /// Locate every manifest for a `name` or `bucket/name` query.
    pub fn locate(&self, query: &str) -> Vec<LocatedManifest> {
        locate::locate_all(query, &self.scopes)
    }

    /// Refresh the index when empty or stale, then flush it.
    ///
    /// # Errors
    ///
    /// Returns an error only when the refreshed cache cannot be flushed.
    pub async fn ensure_fresh(&mut self) -> Result<(), CacheError> {
        let buckets = self.buckets();
        self.index.ensure_fresh(&buckets).await
    }

    /// Rescan buckets (honoring the staleness window unless `forced`) and
    /// flush the cache.
    ///
    /// # Errors
    ///
    /// Returns an error only when the refreshed cache cannot be flushed.
    pub async fn refresh(&mut self, forced: bool) -> Result<(), CacheError> {
        let buckets = self.buckets();
        self.index.refresh(&buckets, forced).await
    }

    /// Search the persisted index. Callers wanting freshness run
    /// [`ensure_fresh`](Self::ensure_fresh) first.
    pub fn search_index(&self, query: &str, opts: &SearchOptions) -> Vec<PackageIndexEntry> {
        self.index.search(query, opts)
    }

    /// Live search: one worker wave over the bucket directories, bypassing
    /// the cache. With `installed_only`, matches are limited to apps that
    /// are currently installed.
    pub async fn search_buckets(
        &self,
        query: &str,
        opts: &SearchOptions,
        installed_only: bool,
    ) -> Vec<SearchMatch> {
        let allowlist = installed_only.then(|| {
            self.installed()
                .iter()
                .map(|app| app.name.to_lowercase())
                .collect::<Vec<_>>()
        });

        let jobs: Vec<SearchJob> = self
            .buckets()
            .into_iter()
            .filter(|b| {
                opts.bucket
                    .as_deref()
                    .is_none_or(|filter| b.name.eq_ignore_ascii_case(filter))
            })
            .map(|b| SearchJob {
                query: query.to_string(),
                case_sensitive: opts.case_sensitive,
                installed_only: allowlist.clone(),
                dir: b.manifest_dir(),
                bucket: b.name,
                scope: b.scope,
            })
            .collect();

        dispatch::dispatch_search(jobs, &self.config).await
    }

    /// Evaluate the status of every installed app through one worker wave.
    /// Results come back sorted by case-insensitive name.
    pub async fn status(&self, progress: &dyn ProgressSink) -> Vec<AppStatus> {
        let apps = self.installed().as_ref().clone();
        let buckets = self.buckets();
        dispatch::dispatch_status(apps, buckets, &self.config, progress).await
    }

    /// Pull every bucket that has a recorded remote, then force a refresh.
    ///
    /// The sync capability is injected; the engine never runs git itself.
    ///
    /// # Errors
    ///
    /// Returns an error when the post-update refresh cannot be flushed;
    /// individual bucket pull failures degrade to warnings.
    pub async fn update_buckets(
        &mut self,
        sync: &dyn RepoSync,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let buckets = self.buckets();
        let total = buckets.len();
        for (done, entry) in buckets.iter().enumerate() {
            if entry.remote.is_none() || !sync.is_repo(&entry.dir).await {
                progress.progress(done + 1, total);
                continue;
            }
            if let Err(e) = sync.pull(&entry.dir).await {
                progress.warning(&format!("bucket '{}' failed to update: {e}", entry.name));
            } else {
                match sync.commits_since_remote(&entry.dir).await {
                    Ok(messages) if !messages.is_empty() => {
                        tracing::debug!(
                            bucket = %entry.name,
                            commits = messages.len(),
                            "bucket updated"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!("commit listing for '{}' failed: {e}", entry.name),
                }
            }
            progress.progress(done + 1, total);
        }

        self.installed.invalidate();
        self.refresh(true).await.context("flushing refreshed cache")
    }

    /// Overwrite the cache with a valid empty document.
    ///
    /// # Errors
    ///
    /// Returns an error when the empty document cannot be written.
    pub fn clear_cache(&mut self) -> Result<(), CacheError> {
        self.index.clear()
    }
}
