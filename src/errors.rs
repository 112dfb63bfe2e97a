// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    /// The location may never be watched (e.g. it lives inside an internal cache).
    #[error("Unable to watch directory '{path}': {reason}")]
    NotWatchable { path: PathBuf, reason: String },

    /// Cached state exists under a hierarchy that was not watchable when it was recorded.
    #[error("Found existing snapshot at '{snapshot}' for unwatched hierarchy '{hierarchy}'")]
    UnwatchedSnapshot { snapshot: PathBuf, hierarchy: PathBuf },

    #[error("Watching not supported: {0}")]
    WatchingNotSupported(String),

    /// Raised by native backends when a path is already being watched.
    #[error("Already watching path: {0}")]
    AlreadyWatching(PathBuf),

    #[error("File watcher did not terminate within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("No tokio runtime available to run the file event consumer")]
    RuntimeUnavailable,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Native watcher error: {0}")]
    Native(#[from] notify::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchError>;
