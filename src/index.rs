//! Searchable package index with a disk-persisted incremental cache.
//!
//! Bucket manifests live in thousands of small files on a slow filesystem,
//! so the index is rebuilt incrementally: a cached entry is reused unchanged
//! whenever its stored mtime is at least the file's current mtime, and whole
//! buckets are skipped while their last scan is inside the staleness window.
//! Every failure here degrades — a bad file is skipped, a bad cache starts
//! empty — correctness is preserved at the cost of speed, never as a hard
//! error.

use crate::bucket::{self, BucketEntry};
use crate::installed::mtime_millis;
use crate::manifest::{ManifestRecord, normalize_bins};
use crate::types::InstallScope;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Cache document format version. A mismatch discards all prior caches.
pub const FORMAT_VERSION: u32 = 3;

/// Maximum age of a bucket scan before it is considered untrustworthy.
pub const STALENESS_MS: i64 = 5 * 60 * 1000;

/// Manifests larger than this are skipped outright.
pub const MAX_MANIFEST_BYTES: u64 = 100_000;

/// Files processed between cooperative yields, so one large bucket cannot
/// monopolize the process.
const SCAN_BATCH: usize = 64;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One package as recorded in the index, keyed by (bucket, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageIndexEntry {
    /// Package name (manifest file stem).
    pub name: String,
    /// Version string from the manifest, if present.
    #[serde(default)]
    pub version: Option<String>,
    /// Description from the manifest, if present.
    #[serde(default)]
    pub description: Option<String>,
    /// Bucket the manifest came from.
    pub bucket: String,
    /// Scope the bucket lives under.
    pub scope: InstallScope,
    /// Normalized shim names from the manifest `bin` field.
    #[serde(default)]
    pub bins: Vec<String>,
    /// Source manifest path.
    pub manifest_path: PathBuf,
    /// Source file modification time at scan time, unix millis.
    pub mtime: i64,
}

/// Cached scan of one bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketCache {
    /// When this bucket was last scanned, unix millis.
    pub last_scanned_at: i64,
    /// Highest manifest mtime observed during the scan, unix millis.
    pub last_modified_at: i64,
    /// Index entries, unique per (bucket, name).
    #[serde(default)]
    pub packages: Vec<PackageIndexEntry>,
}

/// The persisted cache document.
///
/// One document per user environment; the orchestrator owns it exclusively,
/// loading lazily, mutating in memory during a refresh, and flushing after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDocument {
    /// Format version; bumping it invalidates all prior caches.
    pub format_version: u32,
    /// When the document was last flushed, unix millis.
    pub last_updated: i64,
    /// Per-bucket caches keyed by `"<scope>:<bucketName>"`.
    #[serde(default)]
    pub buckets: BTreeMap<String, BucketCache>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            last_updated: 0,
            buckets: BTreeMap::new(),
        }
    }
}

impl CacheDocument {
    /// Load a document from disk, degrading to empty on a missing file,
    /// unreadable content, or a format version mismatch.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(doc)) if doc.format_version == FORMAT_VERSION => doc,
            Ok(Some(doc)) => {
                tracing::debug!(
                    found = doc.format_version,
                    expected = FORMAT_VERSION,
                    "cache format version mismatch, starting empty"
                );
                Self::default()
            }
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::debug!("unreadable cache {}: {e}, starting empty", path.display());
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Option<Self>, CacheError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Atomically persist the document: write to a temp file, then rename,
    /// so concurrent readers never observe a partially written cache.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, writing, or the rename fails.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(self)?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, raw)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// True when no bucket holds any entries.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|b| b.packages.is_empty())
    }
}

/// Options for an index search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Match case-sensitively. Default is insensitive.
    pub case_sensitive: bool,
    /// Restrict results to one bucket name.
    pub bucket: Option<String>,
}

/// The package index: a cache document bound to its on-disk location.
#[derive(Debug)]
pub struct PackageIndex {
    path: PathBuf,
    doc: CacheDocument,
}

impl PackageIndex {
    /// Open the index at `path`, loading whatever cache is present.
    pub fn open(path: PathBuf) -> Self {
        let doc = CacheDocument::load(&path);
        Self { path, doc }
    }

    /// All entries across all buckets.
    pub fn entries(&self) -> impl Iterator<Item = &PackageIndexEntry> {
        self.doc.buckets.values().flat_map(|b| b.packages.iter())
    }

    /// When the document was last flushed, unix millis.
    pub fn last_updated(&self) -> i64 {
        self.doc.last_updated
    }

    /// Refresh the index if it is empty or stale.
    ///
    /// # Errors
    ///
    /// Returns an error only if flushing the refreshed cache fails.
    pub async fn ensure_fresh(&mut self, buckets: &[BucketEntry]) -> Result<(), CacheError> {
        let age = now_millis() - self.doc.last_updated;
        if self.doc.is_empty() || age >= STALENESS_MS {
            self.refresh(buckets, false).await?;
        }
        Ok(())
    }

    /// Rescan buckets and flush the cache.
    ///
    /// Unless `forced`, buckets scanned within the staleness window are
    /// skipped, and per-file parses are skipped when the cached entry's
    /// stored mtime is at least the file's current mtime.
    ///
    /// # Errors
    ///
    /// Returns an error only if flushing the refreshed cache fails; scan
    /// failures degrade to skipped files or empty buckets.
    pub async fn refresh(&mut self, buckets: &[BucketEntry], forced: bool) -> Result<(), CacheError> {
        let now = now_millis();
        let live_keys: HashSet<String> = buckets.iter().map(|b| b.key().to_string()).collect();

        for entry in buckets {
            let key = entry.key().to_string();
            let prev = self.doc.buckets.get(&key);
            if !forced && prev.is_some_and(|c| now - c.last_scanned_at < STALENESS_MS) {
                continue;
            }
            let rebuilt = scan_bucket(entry, prev).await;
            self.doc.buckets.insert(key, rebuilt);
        }

        // Buckets that disappeared from disk drop out of the cache.
        self.doc.buckets.retain(|key, _| live_keys.contains(key));

        self.doc.last_updated = now_millis();
        self.doc.save(&self.path)
    }

    /// Search the index.
    ///
    /// A package matches when its name or any of its bins matches the query
    /// pattern. Results are unique per (bucket, name). For a plain literal
    /// query longer than one character, exact-name matches sort first; ties
    /// break by case-insensitive name.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Vec<PackageIndexEntry> {
        let Some(pattern) = build_pattern(query, opts.case_sensitive) else {
            return Vec::new();
        };

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut hits = Vec::new();
        for entry in self.entries() {
            if let Some(filter) = &opts.bucket {
                if !entry.bucket.eq_ignore_ascii_case(filter) {
                    continue;
                }
            }
            let matched = pattern.is_match(&entry.name)
                || entry.bins.iter().any(|b| pattern.is_match(b));
            if !matched {
                continue;
            }
            if seen.insert((entry.bucket.clone(), entry.name.to_lowercase())) {
                hits.push(entry.clone());
            }
        }

        rank_hits(&mut hits, query);
        hits
    }

    /// Overwrite the cache with a valid empty document.
    ///
    /// Deliberately not a file deletion: concurrent readers racing a delete
    /// would observe a vanished path instead of a well-formed empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the empty document cannot be written.
    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.doc = CacheDocument::default();
        self.doc.save(&self.path)
    }
}

/// Current time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

async fn scan_bucket(entry: &BucketEntry, prev: Option<&BucketCache>) -> BucketCache {
    let files = bucket::manifest_files(entry);

    let prev_by_name: HashMap<String, &PackageIndexEntry> = prev
        .map(|c| {
            c.packages
                .iter()
                .map(|p| (p.name.to_lowercase(), p))
                .collect()
        })
        .unwrap_or_default();

    let mut packages: Vec<PackageIndexEntry> = Vec::with_capacity(files.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(files.len());
    let mut last_modified = 0i64;

    for (i, path) in files.iter().enumerate() {
        if i > 0 && i % SCAN_BATCH == 0 {
            tokio::task::yield_now().await;
        }

        let Some(name) = file_stem(path) else {
            continue;
        };
        if !seen.insert(name.to_lowercase()) {
            continue;
        }

        let Ok(meta) = std::fs::metadata(path) else {
            continue;
        };
        if meta.len() > MAX_MANIFEST_BYTES {
            tracing::debug!("skipping oversized manifest {}", path.display());
            continue;
        }
        let Some(mtime) = mtime_millis(path) else {
            continue;
        };
        last_modified = last_modified.max(mtime);

        // Incremental invalidation: an entry whose stored mtime is at least
        // the file's current mtime is reused without reparsing.
        if let Some(prev_entry) = prev_by_name.get(&name.to_lowercase()) {
            if prev_entry.mtime >= mtime {
                packages.push((*prev_entry).clone());
                continue;
            }
        }

        let Some(record) = ManifestRecord::parse_file(path) else {
            continue;
        };
        packages.push(PackageIndexEntry {
            name: name.to_string(),
            version: record.version(),
            description: record.description(),
            bucket: entry.name.clone(),
            scope: entry.scope,
            bins: normalize_bins(&record.bin),
            manifest_path: path.clone(),
            mtime,
        });
    }

    BucketCache {
        last_scanned_at: now_millis(),
        last_modified_at: last_modified,
        packages,
    }
}

/// Regex metacharacters that distinguish a pattern from a literal query.
const META: &str = r"\^$.|?*+()[]{}";

fn is_literal(query: &str) -> bool {
    !query.chars().any(|c| META.contains(c))
}

/// Build the match pattern for a query.
///
/// Literal queries are escaped; anything carrying regex metacharacters is
/// compiled as a regex, falling back to the escaped literal when invalid.
pub(crate) fn build_pattern(query: &str, case_sensitive: bool) -> Option<Regex> {
    let compile = |source: &str| {
        RegexBuilder::new(source)
            .case_insensitive(!case_sensitive)
            .build()
            .ok()
    };
    if is_literal(query) {
        compile(&regex::escape(query))
    } else {
        compile(query).or_else(|| compile(&regex::escape(query)))
    }
}

fn rank_hits(hits: &mut [PackageIndexEntry], query: &str) {
    if is_literal(query) && query.chars().count() > 1 {
        let query_lower = query.to_lowercase();
        hits.sort_by_key(|e| {
            let exact = e.name.to_lowercase() == query_lower;
            (!exact, e.name.to_lowercase())
        });
    } else {
        hits.sort_by_key(|e| e.name.to_lowercase());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::ScopePaths;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Vec<BucketEntry>, PathBuf) {
        let tmp = TempDir::new().expect("tempdir");
        let paths = ScopePaths::at(InstallScope::User, tmp.path());
        let dir = paths.buckets().join("main");
        fs::create_dir_all(&dir).expect("mkdir");
        write_manifest(&dir, "git", "2.44.0", &["git.exe"]);
        write_manifest(&dir, "gitea", "1.21.0", &["gitea.exe"]);
        write_manifest(&dir, "gifsicle", "1.95", &["gifsicle.exe"]);
        write_manifest(&dir, "ripgrep", "14.1.0", &["rg.exe"]);
        let buckets = crate::bucket::list_buckets(&paths);
        let cache_path = tmp.path().join("cache").join("search-index.json");
        (tmp, buckets, cache_path)
    }

    fn write_manifest(dir: &Path, name: &str, version: &str, bins: &[&str]) {
        let bins = serde_json::to_string(bins).expect("json");
        fs::write(
            dir.join(format!("{name}.json")),
            format!(r#"{{"version": "{version}", "description": "{name} tool", "bin": {bins}}}"#),
        )
        .expect("write");
    }

    fn set_mtime(path: &Path, unix_secs: u64) {
        let file = fs::File::options().write(true).open(path).expect("open");
        file.set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(unix_secs))
            .expect("set mtime");
    }

    #[tokio::test]
    async fn test_refresh_builds_and_persists() {
        let (_tmp, buckets, cache_path) = fixture();
        let mut index = PackageIndex::open(cache_path.clone());
        index.refresh(&buckets, false).await.expect("refresh");

        assert_eq!(index.entries().count(), 4);
        assert!(cache_path.is_file());

        // A second open reads the flushed document back.
        let reopened = PackageIndex::open(cache_path);
        assert_eq!(reopened.entries().count(), 4);
        let git = reopened.entries().find(|e| e.name == "git").expect("git");
        assert_eq!(git.version.as_deref(), Some("2.44.0"));
        assert_eq!(git.bins, vec!["git"]);
    }

    #[tokio::test]
    async fn test_second_refresh_skips_fresh_buckets() {
        let (_tmp, buckets, cache_path) = fixture();
        let mut index = PackageIndex::open(cache_path);
        index.refresh(&buckets, false).await.expect("refresh");
        let first_scan = index.doc.buckets["user:main"].last_scanned_at;

        index.refresh(&buckets, false).await.expect("refresh");
        let second_scan = index.doc.buckets["user:main"].last_scanned_at;
        assert_eq!(first_scan, second_scan, "bucket inside staleness window rescanned");

        index.refresh(&buckets, true).await.expect("refresh");
        assert!(index.doc.buckets["user:main"].last_scanned_at >= first_scan);
    }

    #[tokio::test]
    async fn test_incremental_reuse_by_mtime() {
        let (_tmp, buckets, cache_path) = fixture();
        let dir = buckets[0].manifest_dir();
        set_mtime(&dir.join("git.json"), 1_000);
        set_mtime(&dir.join("ripgrep.json"), 2_000);

        let mut index = PackageIndex::open(cache_path);
        index.refresh(&buckets, false).await.expect("refresh");
        let rg_before = index
            .entries()
            .find(|e| e.name == "ripgrep")
            .expect("ripgrep")
            .clone();

        // Rewrite git with a newer mtime; ripgrep stays untouched.
        write_manifest(&dir, "git", "2.45.0", &["git.exe"]);
        set_mtime(&dir.join("git.json"), 3_000);

        index.refresh(&buckets, true).await.expect("refresh");

        let git = index.entries().find(|e| e.name == "git").expect("git");
        assert_eq!(git.version.as_deref(), Some("2.45.0"));
        assert_eq!(git.mtime, 3_000_000);

        let rg_after = index
            .entries()
            .find(|e| e.name == "ripgrep")
            .expect("ripgrep");
        assert_eq!(*rg_after, rg_before, "unchanged entry must be reused verbatim");
    }

    #[tokio::test]
    async fn test_oversized_manifest_skipped() {
        let (_tmp, buckets, cache_path) = fixture();
        let dir = buckets[0].manifest_dir();
        let huge = format!(
            r#"{{"version": "1.0", "description": "{}"}}"#,
            "x".repeat(MAX_MANIFEST_BYTES as usize)
        );
        fs::write(dir.join("bloat.json"), huge).expect("write");

        let mut index = PackageIndex::open(cache_path);
        index.refresh(&buckets, false).await.expect("refresh");
        assert!(index.entries().all(|e| e.name != "bloat"));
    }

    #[tokio::test]
    async fn test_malformed_manifest_skipped() {
        let (_tmp, buckets, cache_path) = fixture();
        fs::write(buckets[0].manifest_dir().join("broken.json"), "{ not json").expect("write");

        let mut index = PackageIndex::open(cache_path);
        index.refresh(&buckets, false).await.expect("refresh");
        assert_eq!(index.entries().count(), 4);
    }

    #[test]
    fn test_format_version_mismatch_discards_cache() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("search-index.json");
        let mut doc = CacheDocument::default();
        doc.format_version = FORMAT_VERSION - 1;
        doc.buckets.insert("user:main".into(), BucketCache::default());
        doc.save(&path).expect("save");

        let loaded = CacheDocument::load(&path);
        assert_eq!(loaded.format_version, FORMAT_VERSION);
        assert!(loaded.buckets.is_empty());
    }

    #[test]
    fn test_corrupt_cache_starts_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("search-index.json");
        fs::write(&path, "not a cache at all").expect("write");
        assert!(CacheDocument::load(&path).buckets.is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_name_and_bins() {
        let (_tmp, buckets, cache_path) = fixture();
        let mut index = PackageIndex::open(cache_path);
        index.refresh(&buckets, false).await.expect("refresh");

        let by_name = index.search("ripgrep", &SearchOptions::default());
        assert_eq!(by_name.len(), 1);

        // "rg" matches ripgrep's bin, and nothing else's name.
        let by_bin = index.search("rg", &SearchOptions::default());
        assert!(by_bin.iter().any(|e| e.name == "ripgrep"));
    }

    #[tokio::test]
    async fn test_exact_name_ranks_first() {
        let (_tmp, buckets, cache_path) = fixture();
        let mut index = PackageIndex::open(cache_path);
        index.refresh(&buckets, false).await.expect("refresh");

        // "gi" is a substring of both git and gifsicle; "git" is exact for one.
        let hits = index.search("git", &SearchOptions::default());
        assert!(hits.len() >= 1);
        assert_eq!(hits[0].name, "git");
    }

    #[tokio::test]
    async fn test_search_never_duplicates_bucket_name_pairs() {
        let (_tmp, buckets, cache_path) = fixture();
        let mut index = PackageIndex::open(cache_path);
        index.refresh(&buckets, false).await.expect("refresh");

        // "git" matches the name and the bin of the same package.
        let hits = index.search("git", &SearchOptions::default());
        let mut pairs: Vec<(String, String)> = hits
            .iter()
            .map(|e| (e.bucket.clone(), e.name.to_lowercase()))
            .collect();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), hits.len());
    }

    #[tokio::test]
    async fn test_regex_query_supported() {
        let (_tmp, buckets, cache_path) = fixture();
        let mut index = PackageIndex::open(cache_path);
        index.refresh(&buckets, false).await.expect("refresh");

        let hits = index.search("^gi(t|fsicle)$", &SearchOptions::default());
        assert_eq!(hits.len(), 2);

        // Invalid regex degrades to a literal, which matches nothing here.
        let none = index.search("git(", &SearchOptions::default());
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_clear_overwrites_with_valid_empty_document() {
        let (_tmp, buckets, cache_path) = fixture();
        let mut index = PackageIndex::open(cache_path.clone());
        index.refresh(&buckets, false).await.expect("refresh");
        index.clear().expect("clear");

        assert!(cache_path.is_file(), "clear must not delete the file");
        let reloaded = CacheDocument::load(&cache_path);
        assert!(reloaded.buckets.is_empty());
        assert_eq!(reloaded.format_version, FORMAT_VERSION);
    }
}
