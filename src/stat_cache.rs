//! Concurrent memoization of filesystem metadata.
//!
//! During execution every worker consults file modification times; the same
//! header can back hundreds of objects, so each path is stat'ed at most once
//! per build and the result is shared across the pool.

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::SystemTime;

/// Caches `stat` results keyed by the exact path string.
///
/// A stat failure (typically a missing file) is cached as `None` and treated
/// as "changed". Entries are immutable after first insertion, so readers
/// never observe a value change. Paths are never normalized: staleness
/// decisions depend on the exact strings the manifest wrote.
#[derive(Debug, Default)]
pub struct StatCache {
    entries: RwLock<HashMap<Utf8PathBuf, Option<SystemTime>>>,
}

impl StatCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Modification time of `path`, memoized. `None` records a stat error.
    pub fn mtime(&self, path: &Utf8Path) -> Option<SystemTime> {
        if let Some(entry) = self.entries.read().get(path) {
            return *entry;
        }
        let looked_up = std::fs::metadata(path.as_std_path())
            .and_then(|meta| meta.modified())
            .ok();
        // A racing worker may have inserted the same path; the first entry
        // stands and both raced stats saw the same file.
        *self
            .entries
            .write()
            .entry(path.to_owned())
            .or_insert(looked_up)
    }

    /// True when `path` must be considered newer than `reference`.
    ///
    /// A stat failure counts as changed. Equal timestamps also count as
    /// changed: filesystem clocks are coarse enough that a tie proves
    /// nothing, so the tie-break forces a rebuild.
    pub fn changed_since(&self, path: &Utf8Path, reference: SystemTime) -> bool {
        self.mtime(path).map_or(true, |mtime| mtime >= reference)
    }
}
