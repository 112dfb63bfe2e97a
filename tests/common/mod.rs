#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vfswatch::fs::FileSystem;
use vfswatch::fs::mock::MockFileSystem;
use vfswatch::snapshot::{FileSystemSnapshot, SnapshotCollectingDiffListener, SnapshotHierarchy};
use vfswatch::watch::probe::DEFAULT_PROBE_FILE_NAME;
use vfswatch::watch::{FileWatcherUpdater, WatchProbeRegistry};

pub fn p(path: &str) -> PathBuf {
    PathBuf::from(path)
}

pub fn shared(fs: &MockFileSystem) -> Arc<dyn FileSystem> {
    Arc::new(fs.clone())
}

pub fn probes(fs: &MockFileSystem) -> Arc<WatchProbeRegistry> {
    Arc::new(WatchProbeRegistry::new(shared(fs), DEFAULT_PROBE_FILE_NAME))
}

/// Store `snapshot` and return the new hierarchy with the diff it produced.
pub fn store(
    root: &SnapshotHierarchy,
    snapshot: FileSystemSnapshot,
) -> (SnapshotHierarchy, SnapshotCollectingDiffListener) {
    let mut diff = SnapshotCollectingDiffListener::new();
    let root = root.store(snapshot, &mut diff);
    (root, diff)
}

pub fn invalidate(
    root: &SnapshotHierarchy,
    path: &Path,
) -> (SnapshotHierarchy, SnapshotCollectingDiffListener) {
    let mut diff = SnapshotCollectingDiffListener::new();
    let root = root.invalidate(path, &mut diff);
    (root, diff)
}

/// Store `snapshot` and report the change to `updater`, like the VFS does.
pub fn store_and_notify(
    updater: &mut dyn FileWatcherUpdater,
    root: &SnapshotHierarchy,
    snapshot: FileSystemSnapshot,
) -> SnapshotHierarchy {
    let (root, diff) = store(root, snapshot);
    updater
        .virtual_file_system_contents_changed(diff.removed(), diff.added(), &root)
        .unwrap();
    root
}

pub fn invalidate_and_notify(
    updater: &mut dyn FileWatcherUpdater,
    root: &SnapshotHierarchy,
    path: &Path,
) -> SnapshotHierarchy {
    let (root, diff) = invalidate(root, path);
    updater
        .virtual_file_system_contents_changed(diff.removed(), diff.added(), &root)
        .unwrap();
    root
}
