// src/vfs/mod.rs

//! A virtual file system whose cached state survives between builds.
//!
//! Cached state is only retained while file system watching protects it.
//! The file watcher registry is started lazily at the first build with
//! watching enabled, and is closed (dropping all cached state) whenever the
//! watcher reports lost state or an error.

pub mod handlers;
pub mod outputs;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, WatchError};
use crate::fs::FileSystem;
use crate::snapshot::{
    FileSystemSnapshot, NoopDiffListener, SnapshotCollectingDiffListener, SnapshotDiffListener,
    SnapshotHierarchy,
};
use crate::types::{VfsLogging, WatchMode};
use crate::watch::{
    FileWatcherRegistry, FileWatchingStatistics, NativeWatcherFactory, WatchOptions,
    WatchableFileSystemDetector,
};

use handlers::{
    BroadcastingChangeHandler, CompositeChangeHandler, FileChange, FilterOutputChangesHandler,
    InvalidateVfsChangeHandler,
};
use outputs::LocationsWrittenByCurrentBuild;

const FILE_WATCHING_ERROR_MESSAGE_DURING_BUILD: &str = "Unable to watch the file system for changes";
const FILE_WATCHING_ERROR_MESSAGE_AT_END_OF_BUILD: &str =
    "vfswatch was unable to watch the file system for changes";

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
pub(crate) struct VfsState {
    root: SnapshotHierarchy,
    registry: Option<FileWatcherRegistry>,
    /// Registered before the registry was started.
    registered_early: Vec<PathBuf>,
    unsupported_file_systems: Vec<PathBuf>,
    reason_for_not_watching: Option<String>,
    state_invalidated_at_start_of_build: bool,
}

impl VfsState {
    /// Replace the root, reporting the diff to the registry.
    ///
    /// If the registry cannot follow, watching stops and all state is dropped.
    pub(crate) fn update_root(
        &mut self,
        update: impl FnOnce(&SnapshotHierarchy, &mut dyn SnapshotDiffListener) -> SnapshotHierarchy,
    ) {
        let Some(registry) = self.registry.as_mut() else {
            self.root = update(&self.root, &mut NoopDiffListener);
            return;
        };
        let mut diff = SnapshotCollectingDiffListener::new();
        let new_root = update(&self.root, &mut diff);
        let published = diff.publish_snapshot_diff(|removed, added| {
            registry.virtual_file_system_contents_changed(removed, added, &new_root)
        });
        match published {
            Ok(()) => self.root = new_root,
            Err(err) => {
                self.log_watching_error(&err, FILE_WATCHING_ERROR_MESSAGE_DURING_BUILD);
                self.stop_watching_after_error();
            }
        }
    }

    fn log_watching_error(&mut self, err: &WatchError, message: &str) {
        match err {
            WatchError::WatchingNotSupported(reason) => warn!("{message}. {reason}."),
            other => warn!(error = %other, "{message}"),
        }
        self.reason_for_not_watching = Some(err.to_string());
    }

    fn stop_watching_after_error(&mut self) {
        error!("Stopping file watching and invalidating VFS after an error happened");
        if let Some(registry) = self.registry.take() {
            close_in_background(registry);
        }
        self.root = SnapshotHierarchy::empty();
    }

    /// Take the registry out so it can be closed without holding the lock.
    fn drop_state_and_take_registry(&mut self) -> Option<FileWatcherRegistry> {
        self.root = SnapshotHierarchy::empty();
        self.registry.take()
    }
}

fn has_dropped_state_because_of_errors(statistics: &FileWatchingStatistics) -> bool {
    if statistics.unknown_event_encountered {
        warn!("Dropped VFS state due to lost state");
        return true;
    }
    if let Some(err) = &statistics.error_while_receiving {
        warn!(error = %err, "Dropped VFS state due to error while receiving file changes");
        return true;
    }
    false
}

pub(crate) fn lock_state(state: &Mutex<VfsState>) -> MutexGuard<'_, VfsState> {
    state.lock().unwrap_or_else(|poisoned| {
        warn!("VFS state lock poisoned; continuing");
        poisoned.into_inner()
    })
}

fn close_in_background(registry: FileWatcherRegistry) {
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(err) = registry.close().await {
                    error!(error = %err, "Couldn't close watch service");
                }
            });
        }
        // Dropping the registry still stops the native watcher.
        Err(_) => drop(registry),
    }
}

async fn close_registry(registry: FileWatcherRegistry) {
    if let Err(err) = registry.close().await {
        error!(error = %err, "Couldn't close watch service");
    }
}

#[derive(Debug)]
pub struct WatchingVirtualFileSystem {
    state: Arc<Mutex<VfsState>>,
    fs: Arc<dyn FileSystem>,
    factory: Arc<dyn NativeWatcherFactory>,
    detector: Arc<dyn WatchableFileSystemDetector>,
    options: WatchOptions,
    changes: broadcast::Sender<FileChange>,
    locations_written: LocationsWrittenByCurrentBuild,
}

impl WatchingVirtualFileSystem {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        factory: Arc<dyn NativeWatcherFactory>,
        detector: Arc<dyn WatchableFileSystemDetector>,
        options: WatchOptions,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(VfsState::default())),
            fs,
            factory,
            detector,
            options,
            changes,
            locations_written: LocationsWrittenByCurrentBuild::new(),
        }
    }

    pub fn root(&self) -> SnapshotHierarchy {
        self.lock().root.clone()
    }

    /// Changes reported by the watcher, after filtering out the build's own writes.
    pub fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }

    pub fn locations_written_by_current_build(&self) -> &LocationsWrittenByCurrentBuild {
        &self.locations_written
    }

    pub fn store(&self, snapshot: FileSystemSnapshot) {
        self.lock()
            .update_root(|root, listener| root.store(snapshot, listener));
    }

    pub fn invalidate(&self, locations: &[PathBuf]) {
        self.lock().update_root(|root, listener| {
            locations
                .iter()
                .fold(root.clone(), |root, path| root.invalidate(path, listener))
        });
    }

    pub fn invalidate_all(&self) {
        self.lock()
            .update_root(|root, listener| root.invalidate_all(listener));
    }

    pub fn register_watchable_hierarchy(&self, hierarchy: &Path) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(registry) = state.registry.as_mut() else {
            if !state.registered_early.iter().any(|h| h == hierarchy) {
                state.registered_early.push(hierarchy.to_path_buf());
            }
            return;
        };
        if let Err(err) = registry.register_watchable_hierarchy(hierarchy, &state.root) {
            state.log_watching_error(&err, FILE_WATCHING_ERROR_MESSAGE_DURING_BUILD);
            state.stop_watching_after_error();
        }
    }

    /// Prepare the cached state for a new build.
    ///
    /// Returns whether file system watching is active for this build.
    pub async fn after_build_started(&self, mode: WatchMode, logging: VfsLogging) -> bool {
        let to_close = {
            let mut state = self.lock();
            state.state_invalidated_at_start_of_build = false;
            state.reason_for_not_watching = None;

            if !mode.is_enabled() {
                state.drop_state_and_take_registry()
            } else {
                state.unsupported_file_systems = match mode {
                    WatchMode::Default => self.detector.detect_unsupported_file_systems(),
                    WatchMode::Enabled | WatchMode::Disabled => Vec::new(),
                };
                if state.registry.is_none() {
                    state.root = SnapshotHierarchy::empty();
                    self.start_watching(&mut state, mode);
                    None
                } else {
                    self.update_on_build_started(&mut state, mode, logging)
                }
            }
        };
        if let Some(registry) = to_close {
            close_registry(registry).await;
        }
        self.locations_written.build_started();
        self.lock().registry.is_some()
    }

    fn update_on_build_started(
        &self,
        state: &mut VfsState,
        mode: WatchMode,
        logging: VfsLogging,
    ) -> Option<FileWatcherRegistry> {
        let registry = state.registry.as_mut()?;
        let statistics = registry.get_and_reset_statistics();
        let watched_hierarchies = registry.number_of_watched_hierarchies();

        if has_dropped_state_because_of_errors(&statistics) {
            return state.drop_state_and_take_registry();
        }

        let current = state.root.clone();
        match registry.update_vfs_on_build_started(
            current.clone(),
            mode,
            &state.unsupported_file_systems,
        ) {
            Ok(root) => {
                state.state_invalidated_at_start_of_build = !root.ptr_eq(&current);
                state.root = root;
            }
            Err(err) => {
                state.log_watching_error(&err, FILE_WATCHING_ERROR_MESSAGE_DURING_BUILD);
                return state.drop_state_and_take_registry();
            }
        }

        if logging == VfsLogging::Verbose {
            let retained = state.root.retained_statistics();
            warn!(
                "Received {} file system events since last build while watching {} locations",
                statistics.number_of_received_events, watched_hierarchies
            );
            warn!(
                "Virtual file system retained information about {} files, {} directories and {} missing files since last build",
                retained.regular_files, retained.directories, retained.missing_files
            );
            if state.state_invalidated_at_start_of_build {
                warn!("Parts of the virtual file system have been invalidated since they didn't support watching");
            }
        }
        None
    }

    /// Start the registry and replay the hierarchies registered so far.
    ///
    /// The caller has already emptied the cached state.
    fn start_watching(&self, state: &mut VfsState, mode: WatchMode) {
        let handler = FilterOutputChangesHandler::new(
            self.locations_written.clone(),
            CompositeChangeHandler::new(vec![
                Box::new(InvalidateVfsChangeHandler::new(Arc::downgrade(&self.state))),
                Box::new(BroadcastingChangeHandler::new(self.changes.clone())),
            ]),
        );
        let mut registry = match FileWatcherRegistry::start(
            self.factory.as_ref(),
            &self.options,
            Arc::clone(&self.fs),
            Box::new(handler),
        ) {
            Ok(registry) => registry,
            Err(err) => {
                state.log_watching_error(&err, FILE_WATCHING_ERROR_MESSAGE_DURING_BUILD);
                return;
            }
        };

        let early = std::mem::take(&mut state.registered_early);
        let started = registry
            .update_vfs_on_build_started(state.root.clone(), mode, &state.unsupported_file_systems)
            .and_then(|root| {
                for hierarchy in &early {
                    registry.register_watchable_hierarchy(hierarchy, &root)?;
                }
                Ok(root)
            });
        match started {
            Ok(root) => {
                info!("started file system watching");
                state.root = root;
                state.registry = Some(registry);
            }
            Err(err) => {
                state.log_watching_error(&err, FILE_WATCHING_ERROR_MESSAGE_DURING_BUILD);
                close_in_background(registry);
            }
        }
    }

    /// Prune the cached state to what stays watched until the next build.
    pub async fn before_build_finished(
        &self,
        mode: WatchMode,
        logging: VfsLogging,
        max_hierarchies_to_watch: usize,
    ) {
        self.locations_written.build_finished();
        let to_close = {
            let mut state = self.lock();
            state.registered_early.clear();
            if !mode.is_enabled() {
                state.root = SnapshotHierarchy::empty();
                None
            } else {
                if let Some(reason) = state.reason_for_not_watching.take() {
                    warn!("{FILE_WATCHING_ERROR_MESSAGE_AT_END_OF_BUILD}. {reason}");
                }
                self.update_before_build_finished(&mut state, mode, logging, max_hierarchies_to_watch)
            }
        };
        if let Some(registry) = to_close {
            close_registry(registry).await;
        }
    }

    fn update_before_build_finished(
        &self,
        state: &mut VfsState,
        mode: WatchMode,
        logging: VfsLogging,
        max_hierarchies_to_watch: usize,
    ) -> Option<FileWatcherRegistry> {
        let Some(registry) = state.registry.as_mut() else {
            state.root = SnapshotHierarchy::empty();
            return None;
        };
        let statistics = registry.get_and_reset_statistics();
        if has_dropped_state_because_of_errors(&statistics) {
            return state.drop_state_and_take_registry();
        }

        match registry.update_vfs_on_build_finished(state.root.clone(), mode, max_hierarchies_to_watch)
        {
            Ok(root) => state.root = root,
            Err(err) => {
                state.log_watching_error(&err, FILE_WATCHING_ERROR_MESSAGE_AT_END_OF_BUILD);
                return state.drop_state_and_take_registry();
            }
        }
        let watched_hierarchies = registry.number_of_watched_hierarchies();

        if logging == VfsLogging::Verbose {
            let retained = state.root.retained_statistics();
            warn!(
                "Received {} file system events during the current build while watching {} locations",
                statistics.number_of_received_events, watched_hierarchies
            );
            warn!(
                "Virtual file system retains information about {} files, {} directories and {} missing files until next build",
                retained.regular_files, retained.directories, retained.missing_files
            );
            if state.state_invalidated_at_start_of_build {
                warn!("Parts of the virtual file system have been removed at the start of the build since they didn't support watching");
            }
        }
        None
    }

    pub fn is_watching_any_locations(&self) -> bool {
        self.lock()
            .registry
            .as_ref()
            .is_some_and(FileWatcherRegistry::is_watching_any_locations)
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.lock()
            .registry
            .as_ref()
            .map(FileWatcherRegistry::watched_roots)
            .unwrap_or_default()
    }

    /// Stop watching and drop all cached state.
    pub async fn close(&self) -> Result<()> {
        debug!("closing VFS, dropping state");
        let registry = self.lock().drop_state_and_take_registry();
        match registry {
            Some(registry) => registry.close().await,
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VfsState> {
        lock_state(&self.state)
    }
}
