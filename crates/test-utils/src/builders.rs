#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use vfswatch::config::{ConfigFile, RawConfigFile};
use vfswatch::snapshot::FileSystemSnapshot;
use vfswatch::types::{ChangeType, WatchMode, WatchStrategy};
use vfswatch::watch::ChangeHandler;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_hierarchy(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.hierarchies.push(path.into());
        self
    }

    pub fn with_ignored_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.watch.ignored_locations.push(path.into());
        self
    }

    pub fn with_mode(mut self, mode: WatchMode) -> Self {
        self.config.watch.mode = mode;
        self
    }

    pub fn with_strategy(mut self, strategy: WatchStrategy) -> Self {
        self.config.watch.strategy = strategy;
        self
    }

    pub fn with_max_hierarchies(mut self, max: usize) -> Self {
        self.config.watch.max_hierarchies = max;
        self
    }

    pub fn with_probe_file_name(mut self, name: &str) -> Self {
        self.config.watch.probe_file_name = name.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory snapshot with the given children.
pub fn dir(path: impl Into<PathBuf>, children: Vec<FileSystemSnapshot>) -> FileSystemSnapshot {
    FileSystemSnapshot::directory(path, children)
}

/// Regular file snapshot with an arbitrary length.
pub fn file(path: impl Into<PathBuf>) -> FileSystemSnapshot {
    FileSystemSnapshot::regular_file(path, 1)
}

pub fn missing(path: impl Into<PathBuf>) -> FileSystemSnapshot {
    FileSystemSnapshot::missing(path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedChange {
    Changed(ChangeType, PathBuf),
    LostState,
}

/// A change handler that records everything it is told.
#[derive(Debug, Clone, Default)]
pub struct RecordingChangeHandler {
    changes: Arc<Mutex<Vec<RecordedChange>>>,
}

impl RecordingChangeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<RecordedChange> {
        self.changes.lock().unwrap().clone()
    }

    pub fn lost_state_count(&self) -> usize {
        self.changes()
            .iter()
            .filter(|c| matches!(c, RecordedChange::LostState))
            .count()
    }

    pub fn changed_paths(&self) -> Vec<PathBuf> {
        self.changes()
            .into_iter()
            .filter_map(|c| match c {
                RecordedChange::Changed(_, path) => Some(path),
                RecordedChange::LostState => None,
            })
            .collect()
    }
}

impl ChangeHandler for RecordingChangeHandler {
    fn handle_change(&mut self, change: ChangeType, path: &Path) {
        self.changes
            .lock()
            .unwrap()
            .push(RecordedChange::Changed(change, path.to_path_buf()));
    }

    fn handle_lost_state(&mut self) {
        self.changes.lock().unwrap().push(RecordedChange::LostState);
    }
}
