// src/watch/watched.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fs::{FileSystem, first_existing_ancestor};
use crate::snapshot::SnapshotHierarchy;
use crate::watch::hierarchy_set::FileHierarchySet;
use crate::watch::watchable::WatchableHierarchies;

/// The hierarchies that are backed by a live watch.
///
/// Values are only ever replaced by a fresh [`WatchedHierarchies::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchedHierarchies {
    hierarchies: FileHierarchySet,
    /// Watched hierarchy -> directory the watch is placed on.
    locations: BTreeMap<PathBuf, PathBuf>,
}

impl WatchedHierarchies {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive what must be watched from the candidates and the cached content.
    ///
    /// Candidates are processed broadest first, then most recently used first.
    /// A candidate covered by an earlier one is skipped, as is a candidate
    /// without cached content. When everything cached under a candidate is
    /// known to be missing, the watch goes to the first existing ancestor.
    pub fn resolve(
        watchable: &WatchableHierarchies,
        root: &SnapshotHierarchy,
        fs: &dyn FileSystem,
    ) -> Self {
        let mut candidates: Vec<(usize, &Path)> = watchable.recently_used().enumerate().collect();
        candidates.sort_by_key(|(recency, path)| (path.components().count(), *recency));

        let mut hierarchies = FileHierarchySet::empty();
        let mut locations = BTreeMap::new();
        for (_, hierarchy) in candidates {
            if hierarchies.contains(hierarchy) {
                continue;
            }
            let content: Vec<_> = root
                .root_snapshots_under(hierarchy)
                .into_iter()
                .filter(|s| !hierarchies.contains(s.path()) && !watchable.ignored_for_watching(s))
                .collect();
            if content.is_empty() {
                debug!(?hierarchy, "nothing cached; not watching");
                continue;
            }
            let location = if content.iter().all(|s| s.is_missing()) {
                first_existing_ancestor(fs, hierarchy)
            } else {
                hierarchy.to_path_buf()
            };
            hierarchies = hierarchies.plus(hierarchy);
            locations.insert(hierarchy.to_path_buf(), location);
        }

        Self {
            hierarchies,
            locations,
        }
    }

    /// Whether `path` is inside a watched hierarchy.
    pub fn contains(&self, path: &Path) -> bool {
        self.hierarchies.contains(path)
    }

    pub fn hierarchies(&self) -> impl Iterator<Item = &Path> {
        self.locations.keys().map(PathBuf::as_path)
    }

    /// Directory the watch for `hierarchy` is placed on.
    pub fn location_of(&self, hierarchy: &Path) -> Option<&Path> {
        self.locations.get(hierarchy).map(PathBuf::as_path)
    }

    /// Distinct watch locations, nested ones collapsed into the outermost.
    pub fn watched_roots(&self) -> Vec<PathBuf> {
        FileHierarchySet::of(self.locations.values().cloned())
            .roots()
            .map(Path::to_path_buf)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
