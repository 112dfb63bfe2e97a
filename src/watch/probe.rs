// src/watch/probe.rs

//! Watch probes: canary files proving that a hierarchy's watch delivers events.
//!
//! Each watchable hierarchy gets one probe file directly below its root.
//! At the end of a build the probe is *armed* by writing the current
//! timestamp into it. When the native watcher reports an event for the probe
//! file, the probe is *triggered*. A probe that is still armed when the next
//! build starts never saw its own event, so the watch for that hierarchy may
//! be silently broken.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::fs::FileSystem;

pub const DEFAULT_PROBE_FILE_NAME: &str = ".vfswatch-probe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Unarmed,
    Armed,
    /// Sticky until the probe is removed.
    Triggered,
}

#[derive(Debug)]
struct WatchProbe {
    hierarchy: PathBuf,
    probe_file: PathBuf,
    state: ProbeState,
}

/// Both indices refer to the same probes and are only touched under one lock.
#[derive(Debug, Default)]
struct ProbeIndex {
    by_hierarchy: HashMap<PathBuf, WatchProbe>,
    by_probe_file: HashMap<PathBuf, PathBuf>,
}

/// Thread-safe registry of watch probes.
///
/// Arming and disarming happen on the build thread while triggers arrive from
/// the event consumer, so every transition holds the registry lock.
#[derive(Debug)]
pub struct WatchProbeRegistry {
    fs: Arc<dyn FileSystem>,
    probe_file_name: String,
    index: Mutex<ProbeIndex>,
}

impl WatchProbeRegistry {
    pub fn new(fs: Arc<dyn FileSystem>, probe_file_name: impl Into<String>) -> Self {
        Self {
            fs,
            probe_file_name: probe_file_name.into(),
            index: Mutex::new(ProbeIndex::default()),
        }
    }

    /// Location of the probe file for `hierarchy`.
    pub fn probe_location(&self, hierarchy: &Path) -> PathBuf {
        hierarchy.join(&self.probe_file_name)
    }

    /// Directory that must be watched for the probe of `hierarchy` to fire.
    pub fn probe_directory(&self, hierarchy: &Path) -> PathBuf {
        hierarchy.to_path_buf()
    }

    pub fn register_probe(&self, hierarchy: &Path) {
        let mut index = self.lock();
        if index.by_hierarchy.contains_key(hierarchy) {
            return;
        }
        let probe_file = self.probe_location(hierarchy);
        debug!(?hierarchy, ?probe_file, "registering watch probe");
        index
            .by_probe_file
            .insert(probe_file.clone(), hierarchy.to_path_buf());
        index.by_hierarchy.insert(
            hierarchy.to_path_buf(),
            WatchProbe {
                hierarchy: hierarchy.to_path_buf(),
                probe_file,
                state: ProbeState::Unarmed,
            },
        );
    }

    /// Discard the probe of a hierarchy that is no longer watchable.
    pub fn remove_probe(&self, hierarchy: &Path) {
        let mut index = self.lock();
        if let Some(probe) = index.by_hierarchy.remove(hierarchy) {
            index.by_probe_file.remove(&probe.probe_file);
        }
    }

    /// UNARMED -> ARMED by writing the probe file.
    ///
    /// Write failures are logged; the probe then stays unarmed and is armed
    /// again at the next opportunity.
    pub fn arm_watch_probe(&self, hierarchy: &Path) {
        let mut index = self.lock();
        let Some(probe) = index.by_hierarchy.get_mut(hierarchy) else {
            return;
        };
        if probe.state != ProbeState::Unarmed {
            return;
        }
        match write_probe(self.fs.as_ref(), &probe.probe_file) {
            Ok(()) => {
                debug!(hierarchy = ?probe.hierarchy, "armed watch probe");
                probe.state = ProbeState::Armed;
            }
            Err(err) => {
                debug!(hierarchy = ?probe.hierarchy, error = %err, "failed to arm watch probe");
            }
        }
    }

    /// ARMED -> UNARMED.
    pub fn disarm_watch_probe(&self, hierarchy: &Path) {
        let mut index = self.lock();
        if let Some(probe) = index.by_hierarchy.get_mut(hierarchy) {
            if probe.state == ProbeState::Armed {
                debug!(?hierarchy, "disarmed watch probe");
                probe.state = ProbeState::Unarmed;
            }
        }
    }

    /// Record an event for `path`. Returns `true` if `path` is a probe file.
    pub fn trigger_watch_probe(&self, path: &Path) -> bool {
        let mut index = self.lock();
        let Some(hierarchy) = index.by_probe_file.get(path).cloned() else {
            return false;
        };
        if let Some(probe) = index.by_hierarchy.get_mut(&hierarchy) {
            if probe.state != ProbeState::Triggered {
                debug!(?hierarchy, "watch probe triggered");
                probe.state = ProbeState::Triggered;
            }
        }
        true
    }

    pub fn probe_state(&self, hierarchy: &Path) -> Option<ProbeState> {
        self.lock().by_hierarchy.get(hierarchy).map(|p| p.state)
    }

    /// Hierarchies whose probe was armed but never triggered.
    pub fn unproven_hierarchies(&self) -> impl Iterator<Item = PathBuf> + use<> {
        let index = self.lock();
        let mut unproven: Vec<PathBuf> = index
            .by_hierarchy
            .values()
            .filter(|p| p.state == ProbeState::Armed)
            .map(|p| p.hierarchy.clone())
            .collect();
        unproven.sort();
        unproven.into_iter()
    }

    fn lock(&self) -> MutexGuard<'_, ProbeIndex> {
        // Every transition is a single assignment, so a poisoned index is still consistent.
        self.index.lock().unwrap_or_else(|poisoned| {
            warn!("watch probe registry lock poisoned; continuing");
            poisoned.into_inner()
        })
    }
}

fn write_probe(fs: &dyn FileSystem, probe_file: &Path) -> anyhow::Result<()> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    fs.write(probe_file, &millis.to_be_bytes())
}
