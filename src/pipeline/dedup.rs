//! Run-wide deduplication of asset work.

use std::path::{Path, PathBuf};

use dashmap::DashSet;

/// Absolute source paths already scheduled in this run.
///
/// Shared by all documents; the first claim for a path wins.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: DashSet<PathBuf>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark `path` as scheduled.
    ///
    /// Returns `true` only for the first caller.
    pub fn claim(&self, path: &Path) -> bool {
        self.seen.insert(path.to_path_buf())
    }

    #[cfg(test)]
    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
