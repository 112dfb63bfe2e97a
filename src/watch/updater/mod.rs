// src/watch/updater/mod.rs

//! Keeping native watches in sync with the cached snapshot hierarchy.
//!
//! Both strategies share [`UpdaterCore`], which owns the watchable and watched
//! hierarchies. They differ in what they hand to the native backend: the
//! hierarchical updater watches whole hierarchies recursively, the
//! non-hierarchical one watches every directory holding cached content.
//! Only the difference between consecutive watch sets reaches the backend.

mod hierarchical;
mod non_hierarchical;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{Result, WatchError};
use crate::fs::FileSystem;
use crate::snapshot::{FileSystemSnapshot, SnapshotCollectingDiffListener, SnapshotHierarchy};
use crate::types::{WatchMode, WatchStrategy};
use crate::watch::native::NativeWatcher;
use crate::watch::probe::WatchProbeRegistry;
use crate::watch::watchable::{WatchFilter, WatchableHierarchies};
use crate::watch::watched::WatchedHierarchies;

pub use hierarchical::HierarchicalFileWatcherUpdater;
pub use non_hierarchical::NonHierarchicalFileWatcherUpdater;

/// Reconciles the desired set of watches with the native backend.
///
/// All methods are called from the single thread coordinating builds.
pub trait FileWatcherUpdater: Send + fmt::Debug {
    fn register_watchable_hierarchy(
        &mut self,
        hierarchy: &Path,
        root: &SnapshotHierarchy,
    ) -> Result<()>;

    /// React to root snapshots replaced in the hierarchy `root`.
    fn virtual_file_system_contents_changed(
        &mut self,
        removed: &[Arc<FileSystemSnapshot>],
        added: &[Arc<FileSystemSnapshot>],
        root: &SnapshotHierarchy,
    ) -> Result<()>;

    fn update_vfs_on_build_started(
        &mut self,
        root: SnapshotHierarchy,
        mode: WatchMode,
        unsupported_file_systems: &[PathBuf],
    ) -> Result<SnapshotHierarchy>;

    fn update_vfs_on_build_finished(
        &mut self,
        root: SnapshotHierarchy,
        mode: WatchMode,
        max_hierarchies_to_watch: usize,
    ) -> Result<SnapshotHierarchy>;

    /// Locations currently handed to the native backend, sorted.
    fn watched_roots(&self) -> Vec<PathBuf>;

    fn number_of_watched_hierarchies(&self) -> usize;

    fn is_watching_any_locations(&self) -> bool {
        !self.watched_roots().is_empty()
    }
}

pub fn create_updater(
    strategy: WatchStrategy,
    native: Arc<dyn NativeWatcher>,
    probes: Arc<WatchProbeRegistry>,
    watch_filter: WatchFilter,
    fs: Arc<dyn FileSystem>,
) -> Box<dyn FileWatcherUpdater> {
    let core = UpdaterCore::new(probes, watch_filter, fs);
    match strategy {
        WatchStrategy::Hierarchical => Box::new(HierarchicalFileWatcherUpdater::new(core, native)),
        WatchStrategy::NonHierarchical => {
            Box::new(NonHierarchicalFileWatcherUpdater::new(core, native))
        }
    }
}

/// State and logic common to both updater strategies.
#[derive(Debug)]
pub struct UpdaterCore {
    watchable: WatchableHierarchies,
    watched: WatchedHierarchies,
    probes: Arc<WatchProbeRegistry>,
    fs: Arc<dyn FileSystem>,
}

impl UpdaterCore {
    pub fn new(
        probes: Arc<WatchProbeRegistry>,
        watch_filter: WatchFilter,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            watchable: WatchableHierarchies::new(Arc::clone(&probes), watch_filter),
            watched: WatchedHierarchies::empty(),
            probes,
            fs,
        }
    }

    pub fn watchable(&self) -> &WatchableHierarchies {
        &self.watchable
    }

    pub fn watched(&self) -> &WatchedHierarchies {
        &self.watched
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn probes(&self) -> &WatchProbeRegistry {
        &self.probes
    }

    fn register_watchable_hierarchy(
        &mut self,
        hierarchy: &Path,
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        self.watchable.register_watchable_hierarchy(hierarchy, root)
    }

    /// Recompute the watched hierarchies, disarming probes of the ones dropped.
    fn update_watched_hierarchies(&mut self, root: &SnapshotHierarchy) {
        let resolved = WatchedHierarchies::resolve(&self.watchable, root, self.fs.as_ref());
        for hierarchy in self.watched.hierarchies() {
            if resolved.location_of(hierarchy).is_none() {
                self.probes.disarm_watch_probe(hierarchy);
            }
        }
        self.watched = resolved;
    }

    /// Whether some added snapshot needs a watch that does not exist yet.
    fn needs_new_watched_hierarchy(&self, added: &[Arc<FileSystemSnapshot>]) -> bool {
        added
            .iter()
            .any(|s| !self.watched.contains(s.path()) && self.watchable.should_watch(s))
    }

    /// Drop state that cannot be trusted at the start of a build.
    ///
    /// Returns the new hierarchy and the invalidations that produced it.
    fn on_build_started(
        &mut self,
        root: SnapshotHierarchy,
        mode: WatchMode,
        unsupported_file_systems: &[PathBuf],
    ) -> (SnapshotHierarchy, SnapshotCollectingDiffListener) {
        let unsupported: &[PathBuf] = match mode {
            WatchMode::Enabled => &[],
            WatchMode::Default | WatchMode::Disabled => unsupported_file_systems,
        };
        let mut diff = SnapshotCollectingDiffListener::new();
        let root = self.watchable.remove_unwatchable_content_on_build_start(
            root,
            unsupported,
            &mut |path: &Path, root: SnapshotHierarchy| root.invalidate(path, &mut diff),
        );
        (root, diff)
    }

    /// Enforce the watch limit and drop content nothing protects.
    ///
    /// Hierarchies inside `unprotected` lack a native watch even though they
    /// resolve as watched, so they are dropped too.
    fn on_build_finished(
        &mut self,
        root: SnapshotHierarchy,
        max_hierarchies_to_watch: usize,
        unprotected: &[PathBuf],
    ) -> (SnapshotHierarchy, SnapshotCollectingDiffListener) {
        let mut diff = SnapshotCollectingDiffListener::new();
        let watched = &self.watched;
        let root = self.watchable.remove_unwatchable_content_on_build_finished(
            root,
            |hierarchy| {
                watched.contains(hierarchy) && !unprotected.iter().any(|u| hierarchy.starts_with(u))
            },
            max_hierarchies_to_watch,
            &mut |path: &Path, root: SnapshotHierarchy| root.invalidate(path, &mut diff),
        );
        (root, diff)
    }

    fn arm_watch_probes(&self) {
        for hierarchy in self.watched.hierarchies() {
            self.probes.arm_watch_probe(hierarchy);
        }
    }

    fn log_watched_hierarchies(&self) {
        info!(
            watched = self.watched.hierarchies().count(),
            watchable = self.watchable.len(),
            "updated watched hierarchies"
        );
    }
}

/// Start watching the existing directories among `paths`.
///
/// Returns the directories handed to the backend; missing ones are skipped.
/// A duplicate watch means two spellings of one location (e.g. on a
/// case-insensitive file system), which cannot be supported.
fn start_watching(
    native: &dyn NativeWatcher,
    fs: &dyn FileSystem,
    paths: &BTreeSet<PathBuf>,
) -> Result<BTreeSet<PathBuf>> {
    let (existing, missing): (BTreeSet<PathBuf>, BTreeSet<PathBuf>) =
        paths.iter().cloned().partition(|p| fs.is_dir(p));
    for path in &missing {
        debug!(?path, "not watching missing directory");
    }
    if existing.is_empty() {
        return Ok(existing);
    }
    let to_start: Vec<PathBuf> = existing.iter().cloned().collect();
    native.start_watching(&to_start).map_err(|err| match err {
        WatchError::AlreadyWatching(path) => WatchError::WatchingNotSupported(format!(
            "Already watching path: {}",
            path.display()
        )),
        other => other,
    })?;
    Ok(existing)
}

fn stop_watching(native: &dyn NativeWatcher, paths: &BTreeSet<PathBuf>) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let paths: Vec<PathBuf> = paths.iter().cloned().collect();
    if !native.stop_watching(&paths)? {
        debug!(?paths, "some locations were not being watched");
    }
    Ok(())
}

/// Rejects locations reached through a symlinked ancestor.
fn check_location_to_watch(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    match fs.canonicalize(path) {
        Ok(canonical) if canonical != path => Err(WatchError::WatchingNotSupported(format!(
            "Unable to watch '{}' since its canonical path is '{}'",
            path.display(),
            canonical.display()
        ))),
        _ => Ok(()),
    }
}
