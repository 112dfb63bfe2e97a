// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::{VfsLogging, WatchMode, WatchStrategy};
use crate::watch::probe::DEFAULT_PROBE_FILE_NAME;
use crate::watch::{WatchFilter, WatchOptions};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// hierarchies = ["src", "assets"]
///
/// [watch]
/// mode = "default"
/// strategy = "hierarchical"
/// max_hierarchies = 50
/// ignored_locations = [".cache"]
/// ```
///
/// All sections are optional and have reasonable defaults. Relative paths are
/// resolved against the directory containing the config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// `[watch]` section.
    #[serde(default)]
    pub watch: WatchSection,

    /// Hierarchies to snapshot and watch.
    #[serde(default)]
    pub hierarchies: Vec<PathBuf>,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// `"default"`, `"enabled"` or `"disabled"`.
    #[serde(default)]
    pub mode: WatchMode,

    /// `"hierarchical"` or `"non_hierarchical"`; defaults to what the platform supports.
    #[serde(default)]
    pub strategy: WatchStrategy,

    /// Maximum number of hierarchies kept watched between builds.
    #[serde(default = "default_max_hierarchies")]
    pub max_hierarchies: usize,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Name of the probe file written into each watched hierarchy.
    #[serde(default = "default_probe_file_name")]
    pub probe_file_name: String,

    #[serde(default)]
    pub vfs_logging: VfsLogging,

    /// Internal locations that may never be watched.
    #[serde(default)]
    pub ignored_locations: Vec<PathBuf>,

    /// Mount points treated as unwatchable in addition to the detected ones.
    #[serde(default)]
    pub unsupported_file_systems: Vec<PathBuf>,
}

fn default_max_hierarchies() -> usize {
    50
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_probe_file_name() -> String {
    DEFAULT_PROBE_FILE_NAME.to_string()
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            mode: WatchMode::default(),
            strategy: WatchStrategy::default(),
            max_hierarchies: default_max_hierarchies(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            probe_file_name: default_probe_file_name(),
            vfs_logging: VfsLogging::default(),
            ignored_locations: Vec::new(),
            unsupported_file_systems: Vec::new(),
        }
    }
}

/// Validated configuration. Built through `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watch: WatchSection,
    pub hierarchies: Vec<PathBuf>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(watch: WatchSection, hierarchies: Vec<PathBuf>) -> Self {
        Self { watch, hierarchies }
    }

    /// Make every configured path absolute, relative to `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        self.hierarchies = self.hierarchies.iter().map(resolve).collect();
        self.watch.ignored_locations = self.watch.ignored_locations.iter().map(resolve).collect();
        self.watch.unsupported_file_systems =
            self.watch.unsupported_file_systems.iter().map(resolve).collect();
        self
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            strategy: self.watch.strategy,
            probe_file_name: self.watch.probe_file_name.clone(),
            shutdown_timeout: Duration::from_millis(self.watch.shutdown_timeout_ms),
            watch_filter: WatchFilter::ignoring(self.watch.ignored_locations.iter().cloned()),
            ..WatchOptions::default()
        }
    }
}
