//! Progress reporting seam.
//!
//! The engine never touches a terminal; callers inject a sink to render
//! live counters however they like.

/// Receives live progress from long-running engine operations.
pub trait ProgressSink: Send + Sync {
    /// Overall counter update: `done` of `total` items evaluated so far.
    /// Counts are cumulative across all workers, never deltas.
    fn progress(&self, done: usize, total: usize);

    /// Non-fatal degradation worth surfacing (worker timed out, bucket skipped).
    fn warning(&self, msg: &str);
}

impl<T: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<T> {
    fn progress(&self, done: usize, total: usize) {
        (**self).progress(done, total);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op sink for silent operations and tests.
#[derive(Clone, Copy, Debug)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn progress(&self, _: usize, _: usize) {}
    fn warning(&self, _: &str) {}
}
