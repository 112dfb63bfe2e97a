use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use vfswatch::errors::{Result, WatchError};
use vfswatch::types::{ChangeType, WatchStrategy};
use vfswatch::watch::{
    NativeEvent, NativeEventSender, NativeWatcher, NativeWatcherFactory,
    WatchableFileSystemDetector,
};

#[derive(Debug, Default)]
struct FakeState {
    watched: BTreeSet<PathBuf>,
    started: Vec<Vec<PathBuf>>,
    stopped: Vec<Vec<PathBuf>>,
    events: Option<NativeEventSender>,
    shut_down: bool,
    fail_next_stop: bool,
}

/// A fake native watcher that:
/// - records every start/stop call
/// - rejects paths that are already watched, like the real backends
/// - lets tests inject events into the registry's queue.
#[derive(Debug, Clone, Default)]
pub struct FakeNativeWatcher {
    state: Arc<Mutex<FakeState>>,
}

impl FakeNativeWatcher {
    pub fn watched(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().watched.iter().cloned().collect()
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().unwrap().watched.contains(path.as_ref())
    }

    /// Paths passed to each `start_watching` call, in order.
    pub fn start_calls(&self) -> Vec<Vec<PathBuf>> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn stop_calls(&self) -> Vec<Vec<PathBuf>> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.lock().unwrap();
        state.started.clear();
        state.stopped.clear();
    }

    /// Make the next `stop_watching` call fail without touching the watches.
    pub fn fail_next_stop(&self) {
        self.state.lock().unwrap().fail_next_stop = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().unwrap().shut_down
    }

    /// Push an event as if the OS had reported it.
    pub fn emit(&self, event: NativeEvent) {
        let sender = self.state.lock().unwrap().events.clone();
        sender
            .expect("fake watcher is not attached to a registry")
            .send(event);
    }

    pub fn emit_change(&self, kind: ChangeType, path: impl Into<PathBuf>) {
        self.emit(NativeEvent::Change {
            kind,
            path: path.into(),
        });
    }

    fn attach(&self, events: NativeEventSender) {
        let mut state = self.state.lock().unwrap();
        state.events = Some(events);
        state.shut_down = false;
    }
}

impl NativeWatcher for FakeNativeWatcher {
    fn start_watching(&self, paths: &[PathBuf]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.shut_down {
            return Err(WatchError::WatchingNotSupported(
                "watcher has been shut down".to_string(),
            ));
        }
        state.started.push(paths.to_vec());
        for path in paths {
            if !state.watched.insert(path.clone()) {
                return Err(WatchError::AlreadyWatching(path.clone()));
            }
        }
        Ok(())
    }

    fn stop_watching(&self, paths: &[PathBuf]) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_stop) {
            return Err(WatchError::IoError(std::io::Error::other("stop_watching failed")));
        }
        state.stopped.push(paths.to_vec());
        let mut all_watched = true;
        for path in paths {
            all_watched &= state.watched.remove(path);
        }
        Ok(all_watched)
    }

    fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shut_down = true;
        state.watched.clear();
        if let Some(events) = state.events.take() {
            events.send(NativeEvent::Terminated);
        }
    }
}

/// Hands out one shared [`FakeNativeWatcher`] and remembers the requested strategies.
#[derive(Debug, Clone, Default)]
pub struct FakeNativeWatcherFactory {
    watcher: FakeNativeWatcher,
    strategies: Arc<Mutex<Vec<WatchStrategy>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl FakeNativeWatcherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watcher(&self) -> FakeNativeWatcher {
        self.watcher.clone()
    }

    /// Number of watchers created so far.
    pub fn created(&self) -> usize {
        self.strategies.lock().unwrap().len()
    }

    pub fn strategies(&self) -> Vec<WatchStrategy> {
        self.strategies.lock().unwrap().clone()
    }

    /// Make the next `create` calls fail.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(reason.into());
    }
}

impl NativeWatcherFactory for FakeNativeWatcherFactory {
    fn create(
        &self,
        strategy: WatchStrategy,
        events: NativeEventSender,
    ) -> Result<Arc<dyn NativeWatcher>> {
        if let Some(reason) = self.fail_with.lock().unwrap().clone() {
            return Err(WatchError::WatchingNotSupported(reason));
        }
        self.strategies.lock().unwrap().push(strategy);
        self.watcher.attach(events);
        Ok(Arc::new(self.watcher.clone()))
    }
}

/// Reports a fixed list of unsupported mount points.
#[derive(Debug, Clone, Default)]
pub struct FakeFileSystemDetector {
    unsupported: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeFileSystemDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unsupported(unsupported: impl IntoIterator<Item = PathBuf>) -> Self {
        let detector = Self::default();
        detector.set_unsupported(unsupported);
        detector
    }

    pub fn set_unsupported(&self, unsupported: impl IntoIterator<Item = PathBuf>) {
        *self.unsupported.lock().unwrap() = unsupported.into_iter().collect();
    }
}

impl WatchableFileSystemDetector for FakeFileSystemDetector {
    fn detect_unsupported_file_systems(&self) -> Vec<PathBuf> {
        self.unsupported.lock().unwrap().clone()
    }
}
