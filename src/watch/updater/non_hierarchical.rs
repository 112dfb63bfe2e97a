// src/watch/updater/non_hierarchical.rs

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::first_existing_ancestor;
use crate::snapshot::{FileSystemSnapshot, SnapshotHierarchy, SnapshotKind, SnapshotVisitResult};
use crate::types::WatchMode;
use crate::watch::native::NativeWatcher;

use super::{FileWatcherUpdater, UpdaterCore, start_watching, stop_watching};

/// Places a flat watch on every directory holding cached content.
///
/// Directories are reference counted: each counted root snapshot holds one
/// reference on its parent directory and on every directory it contains, and
/// each watched hierarchy holds one reference on its probe directory. A watch
/// exists exactly while a directory's count is positive.
#[derive(Debug)]
pub struct NonHierarchicalFileWatcherUpdater {
    core: UpdaterCore,
    native: Arc<dyn NativeWatcher>,
    watched_directories: HashMap<PathBuf, usize>,
    /// Directories referenced by each counted root snapshot.
    counted_snapshots: HashMap<PathBuf, Vec<PathBuf>>,
    probe_directories: BTreeSet<PathBuf>,
    pending_start: BTreeSet<PathBuf>,
    pending_stop: BTreeSet<PathBuf>,
}

impl NonHierarchicalFileWatcherUpdater {
    pub fn new(core: UpdaterCore, native: Arc<dyn NativeWatcher>) -> Self {
        Self {
            core,
            native,
            watched_directories: HashMap::new(),
            counted_snapshots: HashMap::new(),
            probe_directories: BTreeSet::new(),
            pending_start: BTreeSet::new(),
            pending_stop: BTreeSet::new(),
        }
    }

    /// Reference count of `directory`; zero when it is not watched.
    pub fn watch_count(&self, directory: &Path) -> usize {
        self.watched_directories.get(directory).copied().unwrap_or(0)
    }

    fn increment(&mut self, directory: &Path) {
        let count = self
            .watched_directories
            .entry(directory.to_path_buf())
            .or_insert(0);
        *count += 1;
        if *count == 1 && !self.pending_stop.remove(directory) {
            self.pending_start.insert(directory.to_path_buf());
        }
    }

    fn decrement(&mut self, directory: &Path) {
        let Some(count) = self.watched_directories.get_mut(directory) else {
            warn!(?directory, "released a directory that was not watched");
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.watched_directories.remove(directory);
            if !self.pending_start.remove(directory) {
                self.pending_stop.insert(directory.to_path_buf());
            }
        }
    }

    fn directories_to_watch(&self, snapshot: &FileSystemSnapshot) -> Vec<PathBuf> {
        let path = snapshot.path();
        let mut directories = Vec::new();
        match snapshot.kind() {
            SnapshotKind::Missing => {
                if let Some(parent) = path.parent() {
                    directories.push(first_existing_ancestor(self.core.fs(), parent));
                }
            }
            SnapshotKind::RegularFile { .. } => {
                directories.extend(path.parent().map(Path::to_path_buf));
            }
            SnapshotKind::Directory { .. } => {
                directories.extend(path.parent().map(Path::to_path_buf));
                let watchable = self.core.watchable();
                snapshot.visit(&mut |node: &FileSystemSnapshot| {
                    if watchable.ignored_for_watching(node) {
                        return SnapshotVisitResult::SkipSubtree;
                    }
                    if node.is_directory() {
                        directories.push(node.path().to_path_buf());
                    }
                    SnapshotVisitResult::Continue
                });
            }
        }
        directories
    }

    fn snapshot_added(&mut self, snapshot: &FileSystemSnapshot) {
        if !self.core.watchable().should_watch(snapshot) {
            return;
        }
        self.snapshot_removed(snapshot);
        let directories = self.directories_to_watch(snapshot);
        for directory in &directories {
            self.increment(directory);
        }
        self.counted_snapshots
            .insert(snapshot.path().to_path_buf(), directories);
    }

    fn snapshot_removed(&mut self, snapshot: &FileSystemSnapshot) {
        if let Some(directories) = self.counted_snapshots.remove(snapshot.path()) {
            for directory in &directories {
                self.decrement(directory);
            }
        }
    }

    fn apply_diff(&mut self, removed: &[Arc<FileSystemSnapshot>], added: &[Arc<FileSystemSnapshot>]) {
        for snapshot in removed {
            self.snapshot_removed(snapshot);
        }
        for snapshot in added {
            self.snapshot_added(snapshot);
        }
    }

    fn update_watched_hierarchies(&mut self, root: &SnapshotHierarchy) {
        self.core.update_watched_hierarchies(root);

        let watched = self.core.watched();
        let desired: BTreeSet<PathBuf> = watched
            .hierarchies()
            .filter(|h| watched.location_of(h) == Some(*h))
            .map(|h| self.core.probes().probe_directory(h))
            .collect();
        let released: Vec<PathBuf> = self.probe_directories.difference(&desired).cloned().collect();
        let acquired: Vec<PathBuf> = desired.difference(&self.probe_directories).cloned().collect();
        for directory in &released {
            self.decrement(directory);
        }
        for directory in &acquired {
            self.increment(directory);
        }
        self.probe_directories = desired;
    }

    /// Send pending changes to the backend.
    ///
    /// Counted directories that do not exist stay pending until they do. On
    /// error the pending sets are kept so the next flush retries them.
    fn flush(&mut self) -> Result<()> {
        if self.pending_stop.is_empty() && self.pending_start.is_empty() {
            return Ok(());
        }
        debug!(
            to_start = ?self.pending_start,
            to_stop = ?self.pending_stop,
            "updating watched directories"
        );

        let to_stop = std::mem::take(&mut self.pending_stop);
        if let Err(err) = stop_watching(self.native.as_ref(), &to_stop) {
            self.pending_stop = to_stop;
            return Err(err);
        }
        let to_start = std::mem::take(&mut self.pending_start);
        let started = match start_watching(self.native.as_ref(), self.core.fs(), &to_start) {
            Ok(started) => started,
            Err(err) => {
                self.pending_start = to_start;
                return Err(err);
            }
        };
        self.pending_start = to_start.difference(&started).cloned().collect();

        if !to_stop.is_empty() || !started.is_empty() {
            info!(
                started = started.len(),
                stopped = to_stop.len(),
                watching = self.watched_directories.len().saturating_sub(self.pending_start.len()),
                "updated watched directories"
            );
        }
        Ok(())
    }

    /// Watched hierarchies containing a counted directory without a watch.
    fn unprotected_hierarchies(&self) -> Vec<PathBuf> {
        self.core
            .watched()
            .hierarchies()
            .filter(|h| self.pending_start.iter().any(|d| d.starts_with(h)))
            .map(Path::to_path_buf)
            .collect()
    }
}

impl FileWatcherUpdater for NonHierarchicalFileWatcherUpdater {
    fn register_watchable_hierarchy(
        &mut self,
        hierarchy: &Path,
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        self.core.register_watchable_hierarchy(hierarchy, root)?;
        self.update_watched_hierarchies(root);
        self.flush()
    }

    fn virtual_file_system_contents_changed(
        &mut self,
        removed: &[Arc<FileSystemSnapshot>],
        added: &[Arc<FileSystemSnapshot>],
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        self.apply_diff(removed, added);
        if self.core.needs_new_watched_hierarchy(added) {
            self.update_watched_hierarchies(root);
        }
        self.flush()
    }

    fn update_vfs_on_build_started(
        &mut self,
        root: SnapshotHierarchy,
        mode: WatchMode,
        unsupported_file_systems: &[PathBuf],
    ) -> Result<SnapshotHierarchy> {
        let (root, invalidated) = self.core.on_build_started(root, mode, unsupported_file_systems);
        self.apply_diff(invalidated.removed(), invalidated.added());
        self.update_watched_hierarchies(&root);
        self.flush()?;
        Ok(root)
    }

    fn update_vfs_on_build_finished(
        &mut self,
        root: SnapshotHierarchy,
        _mode: WatchMode,
        max_hierarchies_to_watch: usize,
    ) -> Result<SnapshotHierarchy> {
        self.update_watched_hierarchies(&root);
        self.flush()?;
        let unprotected = self.unprotected_hierarchies();
        let (root, invalidated) =
            self.core
                .on_build_finished(root, max_hierarchies_to_watch, &unprotected);
        self.apply_diff(invalidated.removed(), invalidated.added());
        self.update_watched_hierarchies(&root);
        self.flush()?;
        self.core.arm_watch_probes();
        self.core.log_watched_hierarchies();
        Ok(root)
    }

    fn watched_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self
            .watched_directories
            .keys()
            .filter(|d| !self.pending_start.contains(*d))
            .cloned()
            .collect();
        roots.sort();
        roots
    }

    fn number_of_watched_hierarchies(&self) -> usize {
        self.core.watched().hierarchies().count()
    }
}
