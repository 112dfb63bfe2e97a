// src/watch/mod.rs

//! File system watching for the cached snapshot hierarchy.
//!
//! This module is responsible for:
//! - Tracking which hierarchies may be watched and which actually are.
//! - Keeping native watches (`notify`) in sync with the cached content.
//! - Verifying watches with probe files.
//! - Consuming native events and turning them into changes for a handler.
//!
//! It does **not** own the snapshot hierarchy; callers hand it in and get the
//! updated hierarchy back.

pub mod detector;
pub mod handler;
pub mod hierarchy_set;
pub mod native;
pub mod probe;
pub mod registry;
pub mod statistics;
pub mod updater;
pub mod watchable;
pub mod watched;

pub use detector::{MountTableDetector, WatchableFileSystemDetector};
pub use handler::ChangeHandler;
pub use hierarchy_set::FileHierarchySet;
pub use native::{
    NativeEvent, NativeEventSender, NativeWatcher, NativeWatcherFactory, NotifyWatcherFactory,
};
pub use probe::{ProbeState, WatchProbeRegistry};
pub use registry::{FileWatcherRegistry, WatchOptions};
pub use statistics::FileWatchingStatistics;
pub use updater::FileWatcherUpdater;
pub use watchable::{WatchFilter, WatchableHierarchies};
pub use watched::WatchedHierarchies;
