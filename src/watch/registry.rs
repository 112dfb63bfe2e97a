// src/watch/registry.rs

//! The file watcher registry: native watcher, updater and event consumer.
//!
//! A single tokio task drains the native event queue. It is the only writer of
//! the statistics and the only caller of the [`ChangeHandler`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, WatchError};
use crate::fs::FileSystem;
use crate::snapshot::{FileSystemSnapshot, SnapshotHierarchy};
use crate::types::{ChangeType, WatchMode, WatchStrategy};
use crate::watch::handler::ChangeHandler;
use crate::watch::native::{
    EVENT_QUEUE_CAPACITY, NativeEvent, NativeEventReceiver, NativeWatcher, NativeWatcherFactory,
    event_queue,
};
use crate::watch::probe::{DEFAULT_PROBE_FILE_NAME, WatchProbeRegistry};
use crate::watch::statistics::{FileWatchingStatistics, SharedStatistics};
use crate::watch::updater::{FileWatcherUpdater, create_updater};
use crate::watch::watchable::WatchFilter;

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction-time settings of a [`FileWatcherRegistry`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub strategy: WatchStrategy,
    pub probe_file_name: String,
    pub shutdown_timeout: Duration,
    pub watch_filter: WatchFilter,
    pub event_queue_capacity: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            strategy: WatchStrategy::for_current_platform(),
            probe_file_name: DEFAULT_PROBE_FILE_NAME.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            watch_filter: WatchFilter::allow_all(),
            event_queue_capacity: EVENT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug)]
pub struct FileWatcherRegistry {
    native: Arc<dyn NativeWatcher>,
    updater: Box<dyn FileWatcherUpdater>,
    probes: Arc<WatchProbeRegistry>,
    statistics: SharedStatistics,
    consumer: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl FileWatcherRegistry {
    /// Create the native watcher and spawn the event consumer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        factory: &dyn NativeWatcherFactory,
        options: &WatchOptions,
        fs: Arc<dyn FileSystem>,
        handler: Box<dyn ChangeHandler>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| WatchError::RuntimeUnavailable)?;

        let (sender, receiver) = event_queue(options.event_queue_capacity);
        let native = factory.create(options.strategy, sender)?;
        let probes = Arc::new(WatchProbeRegistry::new(
            Arc::clone(&fs),
            options.probe_file_name.clone(),
        ));
        let updater = create_updater(
            options.strategy,
            Arc::clone(&native),
            Arc::clone(&probes),
            options.watch_filter.clone(),
            fs,
        );
        let statistics = SharedStatistics::default();
        let consumer = runtime.spawn(consume_events(
            receiver,
            handler,
            Arc::clone(&probes),
            statistics.clone(),
        ));

        info!(strategy = ?options.strategy, "file watcher registry started");
        Ok(Self {
            native,
            updater,
            probes,
            statistics,
            consumer,
            shutdown_timeout: options.shutdown_timeout,
        })
    }

    pub fn register_watchable_hierarchy(
        &mut self,
        hierarchy: &Path,
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        self.updater.register_watchable_hierarchy(hierarchy, root)
    }

    pub fn virtual_file_system_contents_changed(
        &mut self,
        removed: &[Arc<FileSystemSnapshot>],
        added: &[Arc<FileSystemSnapshot>],
        root: &SnapshotHierarchy,
    ) -> Result<()> {
        self.updater
            .virtual_file_system_contents_changed(removed, added, root)
    }

    pub fn update_vfs_on_build_started(
        &mut self,
        root: SnapshotHierarchy,
        mode: WatchMode,
        unsupported_file_systems: &[PathBuf],
    ) -> Result<SnapshotHierarchy> {
        self.updater
            .update_vfs_on_build_started(root, mode, unsupported_file_systems)
    }

    pub fn update_vfs_on_build_finished(
        &mut self,
        root: SnapshotHierarchy,
        mode: WatchMode,
        max_hierarchies_to_watch: usize,
    ) -> Result<SnapshotHierarchy> {
        self.updater
            .update_vfs_on_build_finished(root, mode, max_hierarchies_to_watch)
    }

    /// Returns `true` if `path` is the probe file of a watched hierarchy.
    pub fn trigger_watch_probe(&self, path: &Path) -> bool {
        self.probes.trigger_watch_probe(path)
    }

    pub fn probes(&self) -> &WatchProbeRegistry {
        &self.probes
    }

    pub fn get_and_reset_statistics(&self) -> FileWatchingStatistics {
        self.statistics.get_and_reset()
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.updater.watched_roots()
    }

    pub fn number_of_watched_hierarchies(&self) -> usize {
        self.updater.number_of_watched_hierarchies()
    }

    pub fn is_watching_any_locations(&self) -> bool {
        self.updater.is_watching_any_locations()
    }

    /// Stop the native watcher and wait for the consumer to drain.
    ///
    /// The consumer is aborted in any case. Not terminating within the
    /// shutdown timeout is an error.
    pub async fn close(self) -> Result<()> {
        let Self {
            native,
            updater,
            mut consumer,
            shutdown_timeout,
            ..
        } = self;
        drop(updater);
        native.shutdown();

        let outcome = tokio::time::timeout(shutdown_timeout, &mut consumer).await;
        consumer.abort();
        match outcome {
            Ok(Ok(())) => {
                info!("file watcher registry closed");
                Ok(())
            }
            Ok(Err(err)) if err.is_cancelled() => Ok(()),
            Ok(Err(err)) => Err(WatchError::Other(anyhow::anyhow!(
                "file event consumer failed: {err}"
            ))),
            Err(_) => {
                error!(timeout = ?shutdown_timeout, "file watcher did not terminate");
                Err(WatchError::ShutdownTimeout(shutdown_timeout))
            }
        }
    }
}

async fn consume_events(
    mut events: NativeEventReceiver,
    mut handler: Box<dyn ChangeHandler>,
    probes: Arc<WatchProbeRegistry>,
    statistics: SharedStatistics,
) {
    while let Some(event) = events.recv().await {
        report_overflow(&events, handler.as_mut());
        if !handle_event(event, handler.as_mut(), &probes, &statistics) {
            break;
        }
    }
    report_overflow(&events, handler.as_mut());
    debug!("file event consumer stopped");
}

fn report_overflow(events: &NativeEventReceiver, handler: &mut dyn ChangeHandler) {
    if events.take_overflow() {
        warn!("file events were dropped; all cached state is considered lost");
        handler.handle_lost_state();
    }
}

/// Returns `false` once the event stream has ended.
fn handle_event(
    event: NativeEvent,
    handler: &mut dyn ChangeHandler,
    probes: &WatchProbeRegistry,
    statistics: &SharedStatistics,
) -> bool {
    match event {
        NativeEvent::Change { kind, path } => {
            statistics.update(|s| s.number_of_received_events += 1);
            // The probe file is content of its hierarchy too, so it is still reported.
            if probes.trigger_watch_probe(&path) {
                debug!(?path, "watch probe triggered");
            }
            debug!(%kind, ?path, "received file change");
            handler.handle_change(kind, &path);
        }
        NativeEvent::Unknown { path } => {
            statistics.update(|s| {
                s.number_of_received_events += 1;
                s.unknown_event_encountered = true;
            });
            warn!(?path, "received unknown file event; all cached state is considered lost");
            handler.handle_lost_state();
        }
        NativeEvent::Overflow { path: Some(path) } => {
            statistics.update(|s| s.number_of_received_events += 1);
            info!(?path, "file event overflow");
            handler.handle_change(ChangeType::Invalidated, &path);
        }
        NativeEvent::Overflow { path: None } => {
            statistics.update(|s| s.number_of_received_events += 1);
            warn!("file event overflow; all cached state is considered lost");
            handler.handle_lost_state();
        }
        NativeEvent::Failure(message) => {
            error!(%message, "error while receiving file changes");
            statistics.update(|s| s.error_while_receiving = Some(message));
            handler.handle_lost_state();
        }
        NativeEvent::Terminated => {
            debug!("file event stream terminated");
            return false;
        }
    }
    true
}
