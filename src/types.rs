use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Whether file system watching is used for a build.
///
/// - `Default`: watch, but skip file systems detected as unwatchable.
/// - `Enabled`: watch everything, even file systems detected as unwatchable.
/// - `Disabled`: never watch; cached state is dropped at every build boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    Default,
    Enabled,
    Disabled,
}

impl WatchMode {
    pub fn is_enabled(self) -> bool {
        !matches!(self, WatchMode::Disabled)
    }
}

impl Default for WatchMode {
    fn default() -> Self {
        WatchMode::Default
    }
}

impl FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(WatchMode::Default),
            "enabled" => Ok(WatchMode::Enabled),
            "disabled" => Ok(WatchMode::Disabled),
            other => Err(format!(
                "invalid watch mode: {other} (expected \"default\", \"enabled\" or \"disabled\")"
            )),
        }
    }
}

/// How native watches relate to the directory tree.
///
/// - `Hierarchical`: one recursive watch per watched hierarchy (macOS, Windows).
/// - `NonHierarchical`: one flat watch per directory holding cached state (Linux).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStrategy {
    Hierarchical,
    NonHierarchical,
}

impl WatchStrategy {
    /// The strategy matching the native watch API of the current platform.
    pub fn for_current_platform() -> Self {
        if cfg!(any(target_os = "linux", target_os = "android", target_os = "freebsd")) {
            WatchStrategy::NonHierarchical
        } else {
            WatchStrategy::Hierarchical
        }
    }
}

impl Default for WatchStrategy {
    fn default() -> Self {
        WatchStrategy::for_current_platform()
    }
}

/// Verbosity of per-build file system watching statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VfsLogging {
    Normal,
    Verbose,
}

impl Default for VfsLogging {
    fn default() -> Self {
        VfsLogging::Normal
    }
}

/// Kind of change reported for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Created,
    Modified,
    Removed,
    /// The path may have changed in any way, e.g. after an overflow.
    Invalidated,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeType::Created => "CREATED",
            ChangeType::Modified => "MODIFIED",
            ChangeType::Removed => "REMOVED",
            ChangeType::Invalidated => "INVALIDATED",
        };
        f.write_str(s)
    }
}
