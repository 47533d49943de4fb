//! Parallel work dispatch across isolated worker tasks.
//!
//! Workers share no mutable state with the orchestrator or each other:
//! a job goes in as an owned value, results and progress come back as
//! messages. Each unit carries a hard timeout; a worker that times out or
//! panics contributes an empty result instead of failing the wave. The
//! orchestrator suspends for exactly one wave per operation and imposes
//! final ordering itself after the merge.

use crate::bucket::{BucketEntry, list_manifest_files};
use crate::index::build_pattern;
use crate::installed::InstalledPackage;
use crate::manifest::{ManifestRecord, normalize_bins};
use crate::progress::ProgressSink;
use crate::status::{self, AppStatus};
use crate::types::InstallScope;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Deadlines and bounds for worker waves.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Hard timeout for one bucket-search worker.
    pub search_timeout: Duration,
    /// Hard timeout for one status-batch worker.
    pub status_timeout: Duration,
    /// Ceiling on concurrent status batches.
    pub max_status_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(10),
            status_timeout: Duration::from_secs(30),
            max_status_workers: num_cpus::get().min(8),
        }
    }
}

/// Terminal state of one worker unit.
///
/// Units move `Pending -> Running -> {Completed | TimedOut | Errored}`;
/// only the terminal state is observable from outside the wave.
#[derive(Debug)]
pub enum WorkerOutcome<T> {
    /// Unit finished and produced its results.
    Completed(T),
    /// Unit exceeded its deadline; its slot yields empty.
    TimedOut,
    /// Unit panicked or was cancelled; its slot yields empty.
    Errored,
}

impl<T: Default> WorkerOutcome<T> {
    /// Collapse to the unit's contribution. TimedOut and Errored are handled
    /// identically: graceful degradation to empty.
    pub fn into_contribution(self) -> T {
        match self {
            WorkerOutcome::Completed(value) => value,
            WorkerOutcome::TimedOut | WorkerOutcome::Errored => T::default(),
        }
    }
}

/// One bucket-search unit of work, owned entirely by its worker.
#[derive(Debug, Clone)]
pub struct SearchJob {
    /// Bucket name, echoed into every match.
    pub bucket: String,
    /// Scope the bucket lives under.
    pub scope: InstallScope,
    /// Directory holding the bucket's manifests.
    pub dir: PathBuf,
    /// Raw query string.
    pub query: String,
    /// Case-sensitive matching.
    pub case_sensitive: bool,
    /// When set, only these (lowercase) names are considered.
    pub installed_only: Option<Vec<String>>,
}

/// One match from a bucket-search worker.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    /// Package name (manifest file stem).
    pub name: String,
    /// Version from the manifest, when it parsed.
    pub version: Option<String>,
    /// Description from the manifest, when it parsed.
    pub description: Option<String>,
    /// Bucket the match came from.
    pub bucket: String,
    /// Scope the bucket lives under.
    pub scope: InstallScope,
    /// Normalized shim names.
    pub bins: Vec<String>,
}

/// Scan one bucket directory for matches. Runs inside a worker.
///
/// The filename pre-check keeps this cheap: a manifest is only parsed after
/// its stem already matched the pattern.
fn scan_for_matches(job: &SearchJob) -> Vec<SearchMatch> {
    let Some(pattern) = build_pattern(&job.query, job.case_sensitive) else {
        return Vec::new();
    };

    let mut matches = Vec::new();
    for path in list_manifest_files(&job.dir) {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(allow) = &job.installed_only {
            if !allow.iter().any(|name| name.eq_ignore_ascii_case(stem)) {
                continue;
            }
        }
        if !pattern.is_match(stem) {
            continue;
        }
        let Some(record) = ManifestRecord::parse_file(&path) else {
            continue;
        };
        matches.push(SearchMatch {
            name: stem.to_string(),
            version: record.version(),
            description: record.description(),
            bucket: job.bucket.clone(),
            scope: job.scope,
            bins: normalize_bins(&record.bin),
        });
    }
    matches
}

/// Run one wave of bucket-search workers, one per job.
///
/// Results are concatenated without cross-bucket deduplication; that is
/// the caller's concern. A worker that times out or dies contributes
/// nothing — the wave itself never fails.
pub async fn dispatch_search(jobs: Vec<SearchJob>, config: &DispatchConfig) -> Vec<SearchMatch> {
    let mut wave: JoinSet<WorkerOutcome<Vec<SearchMatch>>> = JoinSet::new();
    for job in jobs {
        let limit = config.search_timeout;
        wave.spawn(async move {
            let bucket = job.bucket.clone();
            let unit = tokio::task::spawn_blocking(move || scan_for_matches(&job));
            match timeout(limit, unit).await {
                Ok(Ok(matches)) => WorkerOutcome::Completed(matches),
                Ok(Err(e)) => {
                    tracing::warn!("search worker for '{bucket}' died: {e}");
                    WorkerOutcome::Errored
                }
                Err(_) => {
                    // The abandoned unit is left to finish in the background;
                    // its slot yields empty either way.
                    tracing::warn!("search worker for '{bucket}' timed out");
                    WorkerOutcome::TimedOut
                }
            }
        });
    }

    let mut all = Vec::new();
    while let Some(joined) = wave.join_next().await {
        match joined {
            Ok(outcome) => all.extend(outcome.into_contribution()),
            Err(e) => tracing::warn!("search worker lost: {e}"),
        }
    }
    all
}

/// Cumulative progress message from a status worker.
#[derive(Debug, Clone, Copy)]
struct StatusProgress {
    worker: usize,
    done: usize,
}

/// Number of batches for a status check over `apps` installed apps.
///
/// Small jobs stay in a single worker; larger ones split by fives up to
/// the configured ceiling.
pub fn batch_count(apps: usize, ceiling: usize) -> usize {
    if apps <= 5 {
        1
    } else {
        (apps / 5).clamp(2, ceiling.max(2))
    }
}

/// Run one wave of status workers over the installed-app list.
///
/// The list is split into batches; each worker receives its batch plus the
/// full bucket listing so no cross-worker lookups happen mid-wave. Workers
/// report cumulative progress after each item; the caller's view is the sum
/// of every worker's latest count. Merged results are sorted by
/// case-insensitive name.
pub async fn dispatch_status(
    apps: Vec<InstalledPackage>,
    buckets: Vec<BucketEntry>,
    config: &DispatchConfig,
    progress: &dyn ProgressSink,
) -> Vec<AppStatus> {
    let total = apps.len();
    if total == 0 {
        return Vec::new();
    }

    let batches = batch_count(total, config.max_status_workers);
    let chunk = total.div_ceil(batches);

    let (tx, mut rx) = mpsc::channel::<StatusProgress>(64);
    let mut wave: JoinSet<WorkerOutcome<Vec<AppStatus>>> = JoinSet::new();
    let mut spawned = 0usize;

    for (worker, batch) in apps.chunks(chunk).enumerate() {
        let batch = batch.to_vec();
        let buckets = buckets.clone();
        let tx = tx.clone();
        let limit = config.status_timeout;
        spawned += 1;
        wave.spawn(async move {
            let unit = tokio::task::spawn_blocking(move || {
                let mut results = Vec::with_capacity(batch.len());
                for app in &batch {
                    results.push(status::evaluate(app, &buckets));
                    let _ = tx.blocking_send(StatusProgress {
                        worker,
                        done: results.len(),
                    });
                }
                results
            });
            match timeout(limit, unit).await {
                Ok(Ok(results)) => WorkerOutcome::Completed(results),
                Ok(Err(e)) => {
                    tracing::warn!("status worker {worker} died: {e}");
                    WorkerOutcome::Errored
                }
                Err(_) => {
                    tracing::warn!("status worker {worker} timed out");
                    WorkerOutcome::TimedOut
                }
            }
        });
    }
    drop(tx);

    let mut latest: HashMap<usize, usize> = HashMap::new();
    let mut merged: Vec<AppStatus> = Vec::with_capacity(total);
    let mut pending = spawned;

    while pending > 0 {
        tokio::select! {
            Some(update) = rx.recv() => {
                latest.insert(update.worker, update.done);
                progress.progress(latest.values().sum(), total);
            }
            joined = wave.join_next() => {
                pending -= 1;
                match joined {
                    Some(Ok(WorkerOutcome::TimedOut)) => {
                        progress.warning("a status batch timed out; its apps are omitted");
                    }
                    Some(Ok(outcome)) => merged.extend(outcome.into_contribution()),
                    Some(Err(e)) => tracing::warn!("status worker lost: {e}"),
                    None => break,
                }
            }
        }
    }

    merged.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    merged
}
