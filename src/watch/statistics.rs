// src/watch/statistics.rs

use std::sync::{Arc, Mutex};

/// Counters collected by the event consumer since they were last read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileWatchingStatistics {
    pub number_of_received_events: usize,
    pub unknown_event_encountered: bool,
    /// Last error reported by the native backend.
    pub error_while_receiving: Option<String>,
}

impl FileWatchingStatistics {
    /// Whether the native backend may have missed changes.
    pub fn indicates_lost_state(&self) -> bool {
        self.unknown_event_encountered || self.error_while_receiving.is_some()
    }
}

/// Statistics shared between the consumer (sole writer) and readers.
#[derive(Debug, Clone, Default)]
pub struct SharedStatistics {
    inner: Arc<Mutex<FileWatchingStatistics>>,
}

impl SharedStatistics {
    pub fn update(&self, f: impl FnOnce(&mut FileWatchingStatistics)) {
        let mut stats = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut stats);
    }

    /// Read the counters and start over from zero.
    pub fn get_and_reset(&self) -> FileWatchingStatistics {
        let mut stats = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *stats)
    }
}
