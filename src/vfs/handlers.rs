// src/vfs/handlers.rs

//! Change handlers installed by the watching virtual file system.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, Weak};

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::types::ChangeType;
use crate::vfs::outputs::LocationsWrittenByCurrentBuild;
use crate::vfs::{VfsState, lock_state};
use crate::watch::ChangeHandler;

/// Published to subscribers of the virtual file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Changed { kind: ChangeType, path: PathBuf },
    /// Every cached location may have changed.
    LostState,
}

/// Drops cached state for changed locations.
#[derive(Debug)]
pub(crate) struct InvalidateVfsChangeHandler {
    state: Weak<Mutex<VfsState>>,
}

impl InvalidateVfsChangeHandler {
    pub(crate) fn new(state: Weak<Mutex<VfsState>>) -> Self {
        Self { state }
    }
}

impl ChangeHandler for InvalidateVfsChangeHandler {
    fn handle_change(&mut self, change: ChangeType, path: &Path) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        debug!(%change, ?path, "handling VFS change");
        lock_state(&state).update_root(|root, listener| root.invalidate(path, listener));
    }

    fn handle_lost_state(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        warn!("invalidating the whole VFS after losing file system state");
        lock_state(&state).update_root(|root, listener| root.invalidate_all(listener));
    }
}

/// Publishes every change on a broadcast channel.
#[derive(Debug)]
pub struct BroadcastingChangeHandler {
    tx: broadcast::Sender<FileChange>,
}

impl BroadcastingChangeHandler {
    pub fn new(tx: broadcast::Sender<FileChange>) -> Self {
        Self { tx }
    }

    fn publish(&self, change: FileChange) {
        // No subscribers is fine.
        if self.tx.send(change).is_err() {
            trace!("no subscribers for file change");
        }
    }
}

impl ChangeHandler for BroadcastingChangeHandler {
    fn handle_change(&mut self, change: ChangeType, path: &Path) {
        self.publish(FileChange::Changed {
            kind: change,
            path: path.to_path_buf(),
        });
    }

    fn handle_lost_state(&mut self) {
        self.publish(FileChange::LostState);
    }
}

/// Forwards to every handler, in order.
pub struct CompositeChangeHandler {
    handlers: Vec<Box<dyn ChangeHandler>>,
}

impl CompositeChangeHandler {
    pub fn new(handlers: Vec<Box<dyn ChangeHandler>>) -> Self {
        Self { handlers }
    }
}

impl ChangeHandler for CompositeChangeHandler {
    fn handle_change(&mut self, change: ChangeType, path: &Path) {
        for handler in &mut self.handlers {
            handler.handle_change(change, path);
        }
    }

    fn handle_lost_state(&mut self) {
        for handler in &mut self.handlers {
            handler.handle_lost_state();
        }
    }
}

/// Drops changes to locations written by the running build.
pub struct FilterOutputChangesHandler<H> {
    locations_written: LocationsWrittenByCurrentBuild,
    delegate: H,
}

impl<H: ChangeHandler> FilterOutputChangesHandler<H> {
    pub fn new(locations_written: LocationsWrittenByCurrentBuild, delegate: H) -> Self {
        Self {
            locations_written,
            delegate,
        }
    }
}

impl<H: ChangeHandler> ChangeHandler for FilterOutputChangesHandler<H> {
    fn handle_change(&mut self, change: ChangeType, path: &Path) {
        if self.locations_written.should_watch_location(path) {
            self.delegate.handle_change(change, path);
        } else {
            trace!(%change, ?path, "ignoring change to build output");
        }
    }

    fn handle_lost_state(&mut self) {
        self.delegate.handle_lost_state();
    }
}
