// src/vfs/outputs.rs

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::watch::FileHierarchySet;

/// Locations the running build writes itself.
///
/// Changes reported for them are the build's own doing and are not treated as
/// outside changes. Outside of a build nothing is filtered.
#[derive(Debug, Clone, Default)]
pub struct LocationsWrittenByCurrentBuild {
    written: Arc<Mutex<Option<FileHierarchySet>>>,
}

impl LocationsWrittenByCurrentBuild {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_started(&self) {
        *self.lock() = Some(FileHierarchySet::empty());
    }

    pub fn build_finished(&self) {
        *self.lock() = None;
    }

    /// Record locations about to be written. Ignored outside of a build.
    pub fn locations_updated<I>(&self, locations: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut written = self.lock();
        if let Some(set) = written.as_mut() {
            *set = locations.into_iter().fold(set.clone(), |set, path| set.plus(path));
        }
    }

    pub fn should_watch_location(&self, path: &Path) -> bool {
        match self.lock().as_ref() {
            Some(set) => !set.contains(path),
            None => true,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<FileHierarchySet>> {
        self.written.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
