// src/watch/watchable.rs

//! Candidate hierarchies for watching, tracked across builds.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{Result, WatchError};
use crate::snapshot::{FileSystemSnapshot, SnapshotHierarchy, SnapshotVisitResult};
use crate::watch::hierarchy_set::FileHierarchySet;
use crate::watch::probe::WatchProbeRegistry;

/// Drops the cached state at a path and returns the resulting hierarchy.
pub type Invalidator<'a> = dyn FnMut(&Path, SnapshotHierarchy) -> SnapshotHierarchy + 'a;

/// Decides which locations may ever be watched.
///
/// Locations rejected by the filter (typically internal caches whose content
/// never changes) cannot become watchable hierarchies, and cached state inside
/// them is kept without a watch.
#[derive(Clone)]
pub struct WatchFilter {
    predicate: Arc<dyn Fn(&Path) -> bool + Send + Sync>,
}

impl WatchFilter {
    pub fn new(predicate: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Accept everything.
    pub fn allow_all() -> Self {
        Self::new(|_| true)
    }

    /// Reject everything at or below one of `locations`.
    pub fn ignoring<I, P>(locations: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let ignored = FileHierarchySet::of(locations);
        Self::new(move |path| !ignored.contains(path))
    }

    pub fn should_watch(&self, path: &Path) -> bool {
        (self.predicate)(path)
    }
}

impl fmt::Debug for WatchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchFilter").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct WatchableHierarchies {
    probes: Arc<WatchProbeRegistry>,
    watch_filter: WatchFilter,
    /// Front is the most recently used hierarchy.
    recently_used: VecDeque<PathBuf>,
    hierarchies: FileHierarchySet,
    unwatchable_file_systems: FileHierarchySet,
    /// Registered since the last build finished while their file system was unwatchable.
    deferred: Vec<PathBuf>,
}

impl WatchableHierarchies {
    pub fn new(probes: Arc<WatchProbeRegistry>, watch_filter: WatchFilter) -> Self {
        Self {
            probes,
            watch_filter,
            recently_used: VecDeque::new(),
            hierarchies: FileHierarchySet::empty(),
            unwatchable_file_systems: FileHierarchySet::empty(),
            deferred: Vec::new(),
        }
    }

    pub fn register_watchable_hierarchy(
        &mut self,
        hierarchy: &Path,
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        if !self.watch_filter.should_watch(hierarchy) {
            return Err(WatchError::NotWatchable {
                path: hierarchy.to_path_buf(),
                reason: "it is inside an ignored location".to_string(),
            });
        }

        if self.unwatchable_file_systems.contains(hierarchy) {
            debug!(?hierarchy, "deferring hierarchy on unwatchable file system");
            if !self.deferred.iter().any(|d| d == hierarchy) {
                self.deferred.push(hierarchy.to_path_buf());
            }
            return Ok(());
        }

        if !self.hierarchies.contains(hierarchy) {
            self.check_that_nothing_exists_in_new_watchable_hierarchy(hierarchy, root)?;
        }
        self.recently_used.retain(|h| h != hierarchy);
        self.recently_used.push_front(hierarchy.to_path_buf());
        self.probes.register_probe(hierarchy);
        self.rebuild_hierarchies();

        info!(
            hierarchies = ?self.recently_used,
            "now considering hierarchies to watch"
        );
        Ok(())
    }

    /// Watchable hierarchies, most recently used first.
    pub fn recently_used(&self) -> impl Iterator<Item = &Path> {
        self.recently_used
            .iter()
            .map(PathBuf::as_path)
            .filter(|h| !self.unwatchable_file_systems.contains(h))
    }

    pub fn len(&self) -> usize {
        self.recently_used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recently_used.is_empty()
    }

    pub fn is_in_watchable_hierarchy(&self, path: &Path) -> bool {
        self.hierarchies.contains(path) && !self.unwatchable_file_systems.contains(path)
    }

    /// Content that is never protected by a watch, but also never invalidated for it.
    pub fn ignored_for_watching(&self, snapshot: &FileSystemSnapshot) -> bool {
        snapshot.is_symlink_accessed() || !self.watch_filter.should_watch(snapshot.path())
    }

    /// Whether changes to `snapshot` need a watch.
    pub fn should_watch(&self, snapshot: &FileSystemSnapshot) -> bool {
        !self.ignored_for_watching(snapshot) && self.is_in_watchable_hierarchy(snapshot.path())
    }

    pub fn should_watch_location(&self, path: &Path) -> bool {
        self.watch_filter.should_watch(path)
    }

    /// Drop candidates that are not watched and evict the least recently used
    /// ones beyond `max_count`, invalidating their cached state.
    pub fn remove_watched_hierarchies_over_limit(
        &mut self,
        mut root: SnapshotHierarchy,
        is_watched: impl Fn(&Path) -> bool,
        max_count: usize,
        invalidator: &mut Invalidator<'_>,
    ) -> SnapshotHierarchy {
        let (kept, dropped): (VecDeque<PathBuf>, VecDeque<PathBuf>) = self
            .recently_used
            .drain(..)
            .partition(|h| is_watched(h.as_path()));
        self.recently_used = kept;
        for hierarchy in dropped {
            debug!(?hierarchy, "hierarchy has nothing to watch; no longer a candidate");
            self.probes.remove_probe(&hierarchy);
        }

        if self.recently_used.len() > max_count {
            info!(
                watched = self.recently_used.len(),
                max_count, "watching too many hierarchies; dropping least recently used"
            );
            while self.recently_used.len() > max_count {
                let Some(hierarchy) = self.recently_used.pop_back() else {
                    break;
                };
                debug!(?hierarchy, "evicting least recently used hierarchy");
                self.probes.remove_probe(&hierarchy);
                root = invalidator(&hierarchy, root);
            }
        }

        self.rebuild_hierarchies();
        root
    }

    /// Invalidate cached state that no watch protects.
    pub fn remove_unwatched_snapshots(
        &self,
        root: SnapshotHierarchy,
        invalidator: &mut Invalidator<'_>,
    ) -> SnapshotHierarchy {
        let mut to_invalidate = Vec::new();
        root.visit_snapshot_roots(|snapshot| {
            let path = snapshot.path();
            if !self.watch_filter.should_watch(path) {
                return SnapshotVisitResult::SkipSubtree;
            }
            if snapshot.is_symlink_accessed() || !self.is_in_watchable_hierarchy(path) {
                to_invalidate.push(path.to_path_buf());
                return SnapshotVisitResult::SkipSubtree;
            }
            SnapshotVisitResult::Continue
        });

        to_invalidate
            .into_iter()
            .fold(root, |root, path| invalidator(&path, root))
    }

    pub fn remove_unwatchable_content_on_build_start(
        &mut self,
        mut root: SnapshotHierarchy,
        unsupported_file_systems: &[PathBuf],
        invalidator: &mut Invalidator<'_>,
    ) -> SnapshotHierarchy {
        for hierarchy in self.probes.unproven_hierarchies() {
            if !self.recently_used.contains(&hierarchy) {
                continue;
            }
            warn!(
                ?hierarchy,
                "did not receive the watch probe event since the last build; dropping cached state"
            );
            self.remove_hierarchy(&hierarchy);
            root = invalidator(&hierarchy, root);
        }

        self.unwatchable_file_systems = FileHierarchySet::of(unsupported_file_systems.iter().cloned());
        self.rebuild_hierarchies();
        root = self.remove_unwatched_snapshots(root, invalidator);

        for hierarchy in std::mem::take(&mut self.deferred) {
            if let Err(err) = self.register_watchable_hierarchy(&hierarchy, &root) {
                warn!(?hierarchy, error = %err, "unable to register deferred hierarchy");
            }
        }
        root
    }

    pub fn remove_unwatchable_content_on_build_finished(
        &mut self,
        root: SnapshotHierarchy,
        is_watched: impl Fn(&Path) -> bool,
        max_count: usize,
        invalidator: &mut Invalidator<'_>,
    ) -> SnapshotHierarchy {
        let unwatchable: Vec<PathBuf> = self
            .recently_used
            .iter()
            .filter(|h| self.unwatchable_file_systems.contains(h))
            .cloned()
            .collect();
        for hierarchy in unwatchable {
            info!(
                ?hierarchy,
                "discarding cached state: the file system is not supported for watching"
            );
            self.remove_hierarchy(&hierarchy);
        }
        self.deferred.clear();

        let root = self.remove_watched_hierarchies_over_limit(root, is_watched, max_count, invalidator);
        self.remove_unwatched_snapshots(root, invalidator)
    }

    fn remove_hierarchy(&mut self, hierarchy: &Path) {
        self.recently_used.retain(|h| h != hierarchy);
        self.probes.remove_probe(hierarchy);
        self.rebuild_hierarchies();
    }

    fn rebuild_hierarchies(&mut self) {
        self.hierarchies = FileHierarchySet::of(self.recently_used.iter().cloned());
    }

    fn check_that_nothing_exists_in_new_watchable_hierarchy(
        &self,
        hierarchy: &Path,
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        let offending = root
            .root_snapshots_under(hierarchy)
            .into_iter()
            .find(|snapshot| {
                !self.is_in_watchable_hierarchy(snapshot.path())
                    && !self.ignored_for_watching(snapshot)
            });
        match offending {
            Some(snapshot) => Err(WatchError::UnwatchedSnapshot {
                snapshot: snapshot.path().to_path_buf(),
                hierarchy: hierarchy.to_path_buf(),
            }),
            None => Ok(()),
        }
    }
}
