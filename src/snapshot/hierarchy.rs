// src/snapshot/hierarchy.rs

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FileSystemSnapshot, SnapshotDiffListener, SnapshotKind, SnapshotVisitResult};

/// Immutable, path-indexed cache of file system snapshots.
///
/// Roots are disjoint: no root snapshot lives below another one. Cloning is
/// cheap; every update returns a new hierarchy and reports the roots it
/// removed and added to the given diff listener.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHierarchy {
    roots: Arc<BTreeMap<PathBuf, Arc<FileSystemSnapshot>>>,
}

/// Number of entries retained by a hierarchy, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetainedStatistics {
    pub regular_files: usize,
    pub directories: usize,
    pub missing_files: usize,
}

impl SnapshotHierarchy {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Whether both values are the same hierarchy, i.e. no update happened in between.
    pub fn ptr_eq(&self, other: &SnapshotHierarchy) -> bool {
        Arc::ptr_eq(&self.roots, &other.roots)
    }

    pub fn root_snapshots(&self) -> impl Iterator<Item = &Arc<FileSystemSnapshot>> {
        self.roots.values()
    }

    /// Snapshots at or below `path`, outermost first.
    ///
    /// When `path` lies inside a cached snapshot, the node for `path` itself is
    /// returned (if the snapshot knows about it).
    pub fn root_snapshots_under<'a>(&'a self, path: &'a Path) -> Vec<&'a FileSystemSnapshot> {
        if let Some(root) = self.containing_root(path) {
            return root.find(path).into_iter().collect();
        }
        self.roots_under(path).map(|(_, s)| s.as_ref()).collect()
    }

    pub fn has_descendants_under(&self, path: &Path) -> bool {
        match self.containing_root(path) {
            Some(root) => root.find(path).is_some(),
            None => self.roots_under(path).next().is_some(),
        }
    }

    pub fn find(&self, path: &Path) -> Option<&FileSystemSnapshot> {
        self.containing_root(path).and_then(|root| root.find(path))
    }

    /// Walk every cached snapshot, letting the visitor prune subtrees.
    pub fn visit_snapshot_roots<F>(&self, mut visitor: F)
    where
        F: FnMut(&FileSystemSnapshot) -> SnapshotVisitResult,
    {
        for root in self.roots.values() {
            if !root.visit(&mut visitor) {
                return;
            }
        }
    }

    /// Walk the cached snapshots at or below `path`.
    pub fn visit_snapshot_roots_under<F>(&self, path: &Path, mut visitor: F)
    where
        F: FnMut(&FileSystemSnapshot) -> SnapshotVisitResult,
    {
        for root in self.root_snapshots_under(path) {
            if !root.visit(&mut visitor) {
                return;
            }
        }
    }

    /// Record `snapshot`, replacing whatever was known at and below its path.
    pub fn store(
        &self,
        snapshot: FileSystemSnapshot,
        listener: &mut dyn SnapshotDiffListener,
    ) -> SnapshotHierarchy {
        let path = snapshot.path().to_path_buf();

        if let Some(root) = self.containing_root(&path).cloned() {
            if root.path() != path {
                if let Some(updated) = root.with_descendant(&snapshot) {
                    let mut roots = (*self.roots).clone();
                    let updated = Arc::new(updated);
                    listener.node_removed(&root);
                    listener.node_added(&updated);
                    roots.insert(root.path().to_path_buf(), updated);
                    return Self::from_roots(roots);
                }
                // The cached root does not know the chain down to `path`.
                return self.invalidate(&path, listener).store(snapshot, listener);
            }
        }

        let mut roots = (*self.roots).clone();
        let replaced: Vec<PathBuf> = self.roots_under(&path).map(|(p, _)| p.clone()).collect();
        for key in replaced {
            if let Some(old) = roots.remove(&key) {
                listener.node_removed(&old);
            }
        }
        let snapshot = Arc::new(snapshot);
        listener.node_added(&snapshot);
        roots.insert(path, snapshot);
        Self::from_roots(roots)
    }

    /// Forget everything known at and below `path`.
    ///
    /// A directory snapshot containing `path` is no longer complete; it is
    /// replaced by the parts of it that are still valid.
    pub fn invalidate(
        &self,
        path: &Path,
        listener: &mut dyn SnapshotDiffListener,
    ) -> SnapshotHierarchy {
        let mut roots = (*self.roots).clone();
        let mut changed = false;

        if let Some(root) = self.containing_root(path) {
            if root.path() != path {
                let root = Arc::clone(root);
                roots.remove(root.path());
                listener.node_removed(&root);
                for piece in root.split_without(path) {
                    let piece = Arc::new(piece);
                    listener.node_added(&piece);
                    roots.insert(piece.path().to_path_buf(), piece);
                }
                return Self::from_roots(roots);
            }
        }

        let removed: Vec<PathBuf> = self.roots_under(path).map(|(p, _)| p.clone()).collect();
        for key in removed {
            if let Some(old) = roots.remove(&key) {
                listener.node_removed(&old);
                changed = true;
            }
        }

        if changed {
            Self::from_roots(roots)
        } else {
            self.clone()
        }
    }

    /// Drop every cached snapshot.
    pub fn invalidate_all(&self, listener: &mut dyn SnapshotDiffListener) -> SnapshotHierarchy {
        for root in self.roots.values() {
            listener.node_removed(root);
        }
        Self::empty()
    }

    pub fn retained_statistics(&self) -> RetainedStatistics {
        let mut stats = RetainedStatistics::default();
        self.visit_snapshot_roots(|snapshot| {
            match snapshot.kind() {
                SnapshotKind::Directory { .. } => stats.directories += 1,
                SnapshotKind::RegularFile { .. } => stats.regular_files += 1,
                SnapshotKind::Missing => stats.missing_files += 1,
            }
            SnapshotVisitResult::Continue
        });
        stats
    }

    fn from_roots(roots: BTreeMap<PathBuf, Arc<FileSystemSnapshot>>) -> Self {
        Self {
            roots: Arc::new(roots),
        }
    }

    /// The root snapshot at `path` or above it.
    fn containing_root(&self, path: &Path) -> Option<&Arc<FileSystemSnapshot>> {
        path.ancestors().find_map(|ancestor| self.roots.get(ancestor))
    }

    /// Root snapshots at or below `path`.
    ///
    /// `Path` orders component-wise, so descendants sort directly after `path`.
    fn roots_under<'a>(
        &'a self,
        path: &'a Path,
    ) -> impl Iterator<Item = (&'a PathBuf, &'a Arc<FileSystemSnapshot>)> + 'a {
        self.roots
            .range::<Path, _>((Bound::Included(path), Bound::Unbounded))
            .take_while(move |(p, _)| p.starts_with(path))
    }
}
