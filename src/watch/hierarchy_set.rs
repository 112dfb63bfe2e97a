// src/watch/hierarchy_set.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Immutable set of directory hierarchies.
///
/// A path is contained if it is one of the roots or lies below one. Roots
/// never nest: adding a path below an existing root is a no-op, adding a path
/// above existing roots absorbs them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHierarchySet {
    roots: BTreeSet<PathBuf>,
}

impl FileHierarchySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths
            .into_iter()
            .fold(Self::empty(), |set, path| set.plus(path.into()))
    }

    /// Lookup cost is bounded by the depth of `path`.
    pub fn contains(&self, path: &Path) -> bool {
        path.ancestors().any(|ancestor| self.roots.contains(ancestor))
    }

    pub fn plus(&self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if self.contains(&path) {
            return self.clone();
        }
        let mut roots: BTreeSet<PathBuf> = self
            .roots
            .iter()
            .filter(|root| !root.starts_with(&path))
            .cloned()
            .collect();
        roots.insert(path);
        Self { roots }
    }

    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }
}
