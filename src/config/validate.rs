// src/config/validate.rs

use std::path::{Component, Path};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, WatchError};
use crate::watch::FileHierarchySet;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = WatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.watch, raw.hierarchies))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_hierarchies(cfg)?;
    validate_watch_section(cfg)?;
    validate_probe_file_name(&cfg.watch.probe_file_name)?;
    validate_hierarchies_not_ignored(cfg)?;
    Ok(())
}

fn ensure_has_hierarchies(cfg: &RawConfigFile) -> Result<()> {
    if cfg.hierarchies.is_empty() {
        return Err(WatchError::ConfigError(
            "config must list at least one entry in `hierarchies`".to_string(),
        ));
    }
    Ok(())
}

fn validate_watch_section(cfg: &RawConfigFile) -> Result<()> {
    // mode, strategy and vfs_logging are validated during deserialization.

    if cfg.watch.max_hierarchies == 0 {
        return Err(WatchError::ConfigError(
            "[watch].max_hierarchies must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.watch.shutdown_timeout_ms == 0 {
        return Err(WatchError::ConfigError(
            "[watch].shutdown_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_probe_file_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(WatchError::ConfigError(format!(
            "[watch].probe_file_name must be a plain file name (got '{name}')"
        ))),
    }
}

fn validate_hierarchies_not_ignored(cfg: &RawConfigFile) -> Result<()> {
    let ignored = FileHierarchySet::of(cfg.watch.ignored_locations.iter().cloned());
    for hierarchy in &cfg.hierarchies {
        if ignored.contains(hierarchy) {
            return Err(WatchError::ConfigError(format!(
                "hierarchy '{}' is inside an ignored location",
                hierarchy.display()
            )));
        }
    }
    Ok(())
}
