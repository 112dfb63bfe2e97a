// src/watch/updater/hierarchical.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::errors::Result;
use crate::snapshot::{FileSystemSnapshot, SnapshotHierarchy};
use crate::types::WatchMode;
use crate::watch::native::NativeWatcher;

use super::{
    FileWatcherUpdater, UpdaterCore, check_location_to_watch, start_watching, stop_watching,
};

/// Places one recursive watch on every watched hierarchy.
///
/// Content changes inside a watched hierarchy never change the watches; only
/// hierarchies appearing or disappearing do.
#[derive(Debug)]
pub struct HierarchicalFileWatcherUpdater {
    core: UpdaterCore,
    native: Arc<dyn NativeWatcher>,
    watched_roots: BTreeSet<PathBuf>,
}

impl HierarchicalFileWatcherUpdater {
    pub fn new(core: UpdaterCore, native: Arc<dyn NativeWatcher>) -> Self {
        Self {
            core,
            native,
            watched_roots: BTreeSet::new(),
        }
    }

    fn update_watched_roots(&mut self, root: &SnapshotHierarchy) -> Result<()> {
        self.core.update_watched_hierarchies(root);
        let desired: BTreeSet<PathBuf> = self.core.watched().watched_roots().into_iter().collect();

        let to_stop: BTreeSet<PathBuf> = self.watched_roots.difference(&desired).cloned().collect();
        let to_start: BTreeSet<PathBuf> = desired.difference(&self.watched_roots).cloned().collect();
        if to_stop.is_empty() && to_start.is_empty() {
            return Ok(());
        }
        for path in &to_start {
            check_location_to_watch(self.core.fs(), path)?;
        }

        stop_watching(self.native.as_ref(), &to_stop)?;
        self.watched_roots.retain(|p| !to_stop.contains(p));
        // Missing roots stay out of `watched_roots` and are retried next update.
        let started = start_watching(self.native.as_ref(), self.core.fs(), &to_start)?;
        if to_stop.is_empty() && started.is_empty() {
            return Ok(());
        }
        self.watched_roots.extend(started);

        info!(roots = ?self.watched_roots, "watching hierarchies");
        self.core.log_watched_hierarchies();
        Ok(())
    }

    /// Watched hierarchies whose watch location has no native watch.
    fn unprotected_hierarchies(&self) -> Vec<PathBuf> {
        let watched = self.core.watched();
        watched
            .hierarchies()
            .filter(|h| {
                watched.location_of(h).is_some_and(|location| {
                    !self.watched_roots.iter().any(|r| location.starts_with(r))
                })
            })
            .map(Path::to_path_buf)
            .collect()
    }
}

impl FileWatcherUpdater for HierarchicalFileWatcherUpdater {
    fn register_watchable_hierarchy(
        &mut self,
        hierarchy: &Path,
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        self.core.register_watchable_hierarchy(hierarchy, root)?;
        self.update_watched_roots(root)
    }

    fn virtual_file_system_contents_changed(
        &mut self,
        _removed: &[Arc<FileSystemSnapshot>],
        added: &[Arc<FileSystemSnapshot>],
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        if self.core.needs_new_watched_hierarchy(added) {
            self.update_watched_roots(root)?;
        }
        Ok(())
    }

    fn update_vfs_on_build_started(
        &mut self,
        root: SnapshotHierarchy,
        mode: WatchMode,
        unsupported_file_systems: &[PathBuf],
    ) -> Result<SnapshotHierarchy> {
        let (root, _invalidated) = self.core.on_build_started(root, mode, unsupported_file_systems);
        for watched_root in &self.watched_roots {
            check_location_to_watch(self.core.fs(), watched_root)?;
        }
        self.update_watched_roots(&root)?;
        Ok(root)
    }

    fn update_vfs_on_build_finished(
        &mut self,
        root: SnapshotHierarchy,
        _mode: WatchMode,
        max_hierarchies_to_watch: usize,
    ) -> Result<SnapshotHierarchy> {
        self.update_watched_roots(&root)?;
        let unprotected = self.unprotected_hierarchies();
        let (root, _invalidated) =
            self.core
                .on_build_finished(root, max_hierarchies_to_watch, &unprotected);
        self.update_watched_roots(&root)?;
        self.core.arm_watch_probes();
        Ok(root)
    }

    fn watched_roots(&self) -> Vec<PathBuf> {
        self.watched_roots.iter().cloned().collect()
    }

    fn number_of_watched_hierarchies(&self) -> usize {
        self.core.watched().hierarchies().count()
    }
}
