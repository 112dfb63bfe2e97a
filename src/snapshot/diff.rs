// src/snapshot/diff.rs

use std::sync::Arc;

use super::FileSystemSnapshot;

/// Receives the root snapshots removed from and added to a hierarchy.
pub trait SnapshotDiffListener {
    fn node_removed(&mut self, snapshot: &Arc<FileSystemSnapshot>);
    fn node_added(&mut self, snapshot: &Arc<FileSystemSnapshot>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiffListener;

impl SnapshotDiffListener for NoopDiffListener {
    fn node_removed(&mut self, _snapshot: &Arc<FileSystemSnapshot>) {}
    fn node_added(&mut self, _snapshot: &Arc<FileSystemSnapshot>) {}
}

/// Collects a diff so it can be published after the hierarchy was replaced.
#[derive(Debug, Default, Clone)]
pub struct SnapshotCollectingDiffListener {
    removed: Vec<Arc<FileSystemSnapshot>>,
    added: Vec<Arc<FileSystemSnapshot>>,
}

impl SnapshotCollectingDiffListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }

    pub fn removed(&self) -> &[Arc<FileSystemSnapshot>] {
        &self.removed
    }

    pub fn added(&self) -> &[Arc<FileSystemSnapshot>] {
        &self.added
    }

    /// Hand the collected diff to `publish`, unless nothing changed.
    pub fn publish_snapshot_diff<F, E>(self, publish: F) -> Result<(), E>
    where
        F: FnOnce(&[Arc<FileSystemSnapshot>], &[Arc<FileSystemSnapshot>]) -> Result<(), E>,
    {
        if self.is_empty() {
            return Ok(());
        }
        publish(&self.removed, &self.added)
    }
}

impl SnapshotDiffListener for SnapshotCollectingDiffListener {
    fn node_removed(&mut self, snapshot: &Arc<FileSystemSnapshot>) {
        self.removed.push(Arc::clone(snapshot));
    }

    fn node_added(&mut self, snapshot: &Arc<FileSystemSnapshot>) {
        self.added.push(Arc::clone(snapshot));
    }
}
