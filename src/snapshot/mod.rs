// src/snapshot/mod.rs

//! Cached file system state.
//!
//! A [`FileSystemSnapshot`] is a complete, immutable record of a file, a
//! directory tree or a missing location. Snapshots are grouped into a
//! [`SnapshotHierarchy`], which is replaced (never mutated) on every change.
//! Hierarchy updates report the roots they removed and added through a
//! [`SnapshotDiffListener`]; the watch registry consumes those diffs.

pub mod capture;
pub mod diff;
pub mod hierarchy;

use std::path::{Path, PathBuf};

pub use capture::snapshot_location;
pub use diff::{NoopDiffListener, SnapshotCollectingDiffListener, SnapshotDiffListener};
pub use hierarchy::{RetainedStatistics, SnapshotHierarchy};

/// How a location was reached when it was snapshotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    Direct,
    /// Reached through a symlink; such state cannot be protected by a watch.
    ViaSymlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotKind {
    Directory { children: Vec<FileSystemSnapshot> },
    RegularFile { len: u64 },
    /// The location is known not to exist.
    Missing,
}

/// Returned by snapshot visitors to steer the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotVisitResult {
    Continue,
    SkipSubtree,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemSnapshot {
    path: PathBuf,
    access: AccessType,
    kind: SnapshotKind,
}

impl FileSystemSnapshot {
    /// A complete directory snapshot. Children must be direct children of `path`.
    pub fn directory(path: impl Into<PathBuf>, mut children: Vec<FileSystemSnapshot>) -> Self {
        let path = path.into();
        debug_assert!(children.iter().all(|c| c.path.parent() == Some(path.as_path())));
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            path,
            access: AccessType::Direct,
            kind: SnapshotKind::Directory { children },
        }
    }

    pub fn regular_file(path: impl Into<PathBuf>, len: u64) -> Self {
        Self {
            path: path.into(),
            access: AccessType::Direct,
            kind: SnapshotKind::RegularFile { len },
        }
    }

    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            access: AccessType::Direct,
            kind: SnapshotKind::Missing,
        }
    }

    pub fn with_access(mut self, access: AccessType) -> Self {
        self.access = access;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access(&self) -> AccessType {
        self.access
    }

    pub fn kind(&self) -> &SnapshotKind {
        &self.kind
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, SnapshotKind::Directory { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.kind, SnapshotKind::Missing)
    }

    pub fn is_regular_file(&self) -> bool {
        matches!(self.kind, SnapshotKind::RegularFile { .. })
    }

    pub fn is_symlink_accessed(&self) -> bool {
        self.access == AccessType::ViaSymlink
    }

    pub fn children(&self) -> &[FileSystemSnapshot] {
        match &self.kind {
            SnapshotKind::Directory { children } => children,
            _ => &[],
        }
    }

    /// Depth-first walk over this snapshot and its descendants.
    ///
    /// Returns `false` if the visitor asked to terminate.
    pub fn visit<F>(&self, visitor: &mut F) -> bool
    where
        F: FnMut(&FileSystemSnapshot) -> SnapshotVisitResult,
    {
        match visitor(self) {
            SnapshotVisitResult::Terminate => false,
            SnapshotVisitResult::SkipSubtree => true,
            SnapshotVisitResult::Continue => self.children().iter().all(|c| c.visit(visitor)),
        }
    }

    /// Find the node for `path` inside this snapshot.
    pub fn find(&self, path: &Path) -> Option<&FileSystemSnapshot> {
        if path == self.path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children()
            .iter()
            .find(|c| path.starts_with(&c.path))
            .and_then(|c| c.find(path))
    }

    /// Copy of this snapshot with the node at `replacement.path()` swapped in.
    ///
    /// Returns `None` when the chain of directories down to the replacement's
    /// parent is not part of this snapshot.
    pub(crate) fn with_descendant(&self, replacement: &FileSystemSnapshot) -> Option<Self> {
        let SnapshotKind::Directory { children } = &self.kind else {
            return None;
        };
        let target = replacement.path();
        let mut children = children.clone();

        if target.parent() == Some(self.path.as_path()) {
            match children.iter().position(|c| c.path == target) {
                Some(idx) => children[idx] = replacement.clone(),
                None => children.push(replacement.clone()),
            }
        } else {
            let idx = children.iter().position(|c| target.starts_with(&c.path))?;
            children[idx] = children[idx].with_descendant(replacement)?;
        }

        Some(Self::directory(self.path.clone(), children).with_access(self.access))
    }

    /// Remaining pieces of this snapshot once `path` (a strict descendant) is dropped.
    ///
    /// Every directory on the way down to `path` is no longer complete, so it is
    /// replaced by its other children.
    pub(crate) fn split_without(&self, path: &Path) -> Vec<FileSystemSnapshot> {
        let mut remaining = Vec::new();
        for child in self.children() {
            if child.path == path {
                continue;
            }
            if path.starts_with(&child.path) {
                if child.is_directory() {
                    remaining.extend(child.split_without(path));
                }
            } else {
                remaining.push(child.clone());
            }
        }
        remaining
    }
}
