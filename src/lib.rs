//! ladle - package-metadata discovery and caching engine
//!
//! The library behind the ladle package-manager client. It finds installed
//! apps and bucket manifests across the user and global scopes, answers
//! search and status queries about them, and keeps that fast even though
//! the data lives in thousands of small JSON files on a slow filesystem.
//!
//! # Architecture
//!
//! - **Incremental persistent cache**: bucket scans are cached on disk and
//!   invalidated per file by mtime, so unchanged manifests are never
//!   reparsed ([`index`]).
//! - **Isolated worker waves**: searches and status checks fan out to
//!   tokio worker tasks that share no mutable state with the orchestrator;
//!   a worker that hangs or dies contributes nothing instead of failing
//!   the operation ([`dispatch`]).
//! - **Graceful degradation**: bucket content is untrusted input. Bad
//!   files, bad buckets, and bad caches are skipped, never fatal; the only
//!   hard error in the crate is an unresolvable home directory.
//!
//! # Directory Layout
//!
//! ```text
//! <scopeRoot>/                     user: ~/.ladle, global: ProgramData\ladle
//! ├── apps/<name>/current          directory link to the active version
//! ├── apps/<name>/<version>/       immutable versioned install
//! │   ├── manifest.json            the manifest the version was built from
//! │   └── install.json             {bucket, hold} sidecar
//! ├── buckets/<bucket>[/bucket]/   per-package <name>.json manifests
//! ├── shims/                       PATH stand-ins for installed executables
//! └── cache/search-index.json      persisted package index (user scope)
//! ```
//!
//! The CLI layer, output formatting, and git subprocess handling live in
//! sibling crates; this engine is called as a library and never touches
//! argv or the terminal.

pub mod bucket;
pub mod dispatch;
pub mod engine;
pub mod index;
pub mod installed;
pub mod locate;
pub mod manifest;
pub mod paths;
pub mod progress;
pub mod status;
pub mod sync;
pub mod types;
pub mod version;

// Re-exports for convenience
pub use engine::Engine;
pub use index::{PackageIndex, SearchOptions};
pub use installed::InstalledPackage;
pub use progress::{NullProgress, ProgressSink};
pub use status::AppStatus;
pub use types::InstallScope;
