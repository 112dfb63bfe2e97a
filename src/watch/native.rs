// src/watch/native.rs

//! Native watch backend: the seam between the registry and the OS.
//!
//! Backends push [`NativeEvent`]s into a bounded queue through a
//! [`NativeEventSender`]. A full queue never blocks the backend; the event is
//! dropped and an overflow flag is raised instead, which the consumer turns
//! into a lost-state signal.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::errors::{Result, WatchError};
use crate::types::{ChangeType, WatchStrategy};

/// Number of events buffered between the backend and the consumer.
pub const EVENT_QUEUE_CAPACITY: usize = 20_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    Change { kind: ChangeType, path: PathBuf },
    /// The backend reported something that cannot be classified.
    Unknown { path: Option<PathBuf> },
    /// Events were dropped; with a path, only that location is affected.
    Overflow { path: Option<PathBuf> },
    Failure(String),
    Terminated,
}

/// Producer side of the event queue.
#[derive(Debug, Clone)]
pub struct NativeEventSender {
    tx: mpsc::Sender<NativeEvent>,
    overflowed: Arc<AtomicBool>,
}

impl NativeEventSender {
    pub fn send(&self, event: NativeEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                if !self.overflowed.swap(true, Ordering::AcqRel) {
                    warn!(capacity = EVENT_QUEUE_CAPACITY, "file event queue full; dropping events");
                }
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                trace!(?event, "file event consumer gone; dropping event");
            }
        }
    }
}

/// Consumer side of the event queue.
#[derive(Debug)]
pub struct NativeEventReceiver {
    rx: mpsc::Receiver<NativeEvent>,
    overflowed: Arc<AtomicBool>,
}

impl NativeEventReceiver {
    pub async fn recv(&mut self) -> Option<NativeEvent> {
        self.rx.recv().await
    }

    /// Whether events were dropped since the last call.
    pub fn take_overflow(&self) -> bool {
        self.overflowed.swap(false, Ordering::AcqRel)
    }
}

pub fn event_queue(capacity: usize) -> (NativeEventSender, NativeEventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let overflowed = Arc::new(AtomicBool::new(false));
    (
        NativeEventSender {
            tx,
            overflowed: Arc::clone(&overflowed),
        },
        NativeEventReceiver { rx, overflowed },
    )
}

/// OS watch handle.
///
/// Implementations are driven from the build thread and shut down from the
/// registry, so they synchronise internally.
pub trait NativeWatcher: Send + Sync + fmt::Debug {
    /// Fails with [`WatchError::AlreadyWatching`] for a path that is already watched.
    fn start_watching(&self, paths: &[PathBuf]) -> Result<()>;

    /// Returns `false` if any of the paths was not being watched.
    fn stop_watching(&self, paths: &[PathBuf]) -> Result<bool>;

    /// Stop delivering events. Dropping every queue sender ends the consumer.
    fn shutdown(&self);
}

pub trait NativeWatcherFactory: Send + Sync + fmt::Debug {
    fn create(
        &self,
        strategy: WatchStrategy,
        events: NativeEventSender,
    ) -> Result<Arc<dyn NativeWatcher>>;
}

/// Backend built on `notify`'s recommended watcher for the platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatcherFactory;

impl NativeWatcherFactory for NotifyWatcherFactory {
    fn create(
        &self,
        strategy: WatchStrategy,
        events: NativeEventSender,
    ) -> Result<Arc<dyn NativeWatcher>> {
        Ok(Arc::new(NotifyWatcher::new(strategy, events)?))
    }
}

struct NotifyState {
    watcher: Option<RecommendedWatcher>,
    watched: HashSet<PathBuf>,
    events: Option<NativeEventSender>,
}

pub struct NotifyWatcher {
    mode: RecursiveMode,
    state: Mutex<NotifyState>,
}

impl fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl NotifyWatcher {
    pub fn new(strategy: WatchStrategy, events: NativeEventSender) -> Result<Self> {
        let mode = match strategy {
            WatchStrategy::Hierarchical => RecursiveMode::Recursive,
            WatchStrategy::NonHierarchical => RecursiveMode::NonRecursive,
        };

        let callback_events = events.clone();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for native in classify(event) {
                        callback_events.send(native);
                    }
                }
                Err(err) => callback_events.send(NativeEvent::Failure(err.to_string())),
            },
            Config::default(),
        )?;

        info!(?mode, "native file watcher started");
        Ok(Self {
            mode,
            state: Mutex::new(NotifyState {
                watcher: Some(watcher),
                watched: HashSet::new(),
                events: Some(events),
            }),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, NotifyState>> {
        self.state
            .lock()
            .map_err(|_| WatchError::Other(anyhow::anyhow!("native watcher state poisoned")))
    }
}

impl NativeWatcher for NotifyWatcher {
    fn start_watching(&self, paths: &[PathBuf]) -> Result<()> {
        let mut state = self.lock()?;
        let NotifyState {
            watcher, watched, ..
        } = &mut *state;
        let Some(watcher) = watcher.as_mut() else {
            return Err(WatchError::WatchingNotSupported(
                "the native watcher has been shut down".to_string(),
            ));
        };
        for path in paths {
            if watched.contains(path) {
                return Err(WatchError::AlreadyWatching(path.clone()));
            }
            watcher.watch(path, self.mode)?;
            watched.insert(path.clone());
            debug!(?path, "started watching");
        }
        Ok(())
    }

    fn stop_watching(&self, paths: &[PathBuf]) -> Result<bool> {
        let mut state = self.lock()?;
        let NotifyState {
            watcher, watched, ..
        } = &mut *state;
        let Some(watcher) = watcher.as_mut() else {
            return Ok(false);
        };
        let mut all_stopped = true;
        for path in paths {
            if !watched.remove(path) {
                all_stopped = false;
                continue;
            }
            // The directory may already be gone, which also ends the watch.
            if let Err(err) = watcher.unwatch(path) {
                debug!(?path, error = %err, "failed to stop watching");
                all_stopped = false;
            } else {
                debug!(?path, "stopped watching");
            }
        }
        Ok(all_stopped)
    }

    fn shutdown(&self) {
        let Ok(mut state) = self.lock() else {
            error!("unable to shut down native watcher: state poisoned");
            return;
        };
        state.watched.clear();
        drop(state.watcher.take());
        if let Some(events) = state.events.take() {
            events.send(NativeEvent::Terminated);
        }
        info!("native file watcher stopped");
    }
}

/// Translate one `notify` event into native events, one per affected path.
pub fn classify(event: Event) -> Vec<NativeEvent> {
    if event.need_rescan() {
        return vec![NativeEvent::Overflow {
            path: event.paths.into_iter().next(),
        }];
    }

    match event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) => changes(ChangeType::Created, event.paths),
        EventKind::Remove(_) => changes(ChangeType::Removed, event.paths),
        EventKind::Modify(ModifyKind::Name(rename)) => classify_rename(rename, event.paths),
        EventKind::Modify(_) => changes(ChangeType::Modified, event.paths),
        EventKind::Any | EventKind::Other => vec![NativeEvent::Unknown {
            path: event.paths.into_iter().next(),
        }],
    }
}

fn changes(kind: ChangeType, paths: Vec<PathBuf>) -> Vec<NativeEvent> {
    paths
        .into_iter()
        .map(|path| NativeEvent::Change { kind, path })
        .collect()
}

fn classify_rename(rename: RenameMode, paths: Vec<PathBuf>) -> Vec<NativeEvent> {
    let kind_for = |idx: usize| match rename {
        RenameMode::From => ChangeType::Removed,
        RenameMode::To => ChangeType::Created,
        RenameMode::Both if idx == 0 => ChangeType::Removed,
        RenameMode::Both => ChangeType::Created,
        RenameMode::Any | RenameMode::Other => ChangeType::Invalidated,
    };
    paths
        .into_iter()
        .enumerate()
        .map(|(idx, path)| NativeEvent::Change {
            kind: kind_for(idx),
            path,
        })
        .collect()
}
