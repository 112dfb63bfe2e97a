use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use vfswatch::config::{ConfigFile, load_and_validate, load_from_path};
use vfswatch::errors::WatchError;
use vfswatch::types::{VfsLogging, WatchMode, WatchStrategy};
use vfswatch_test_utils::ConfigFileBuilder;

fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Vfswatch.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

fn config_error(raw: vfswatch::config::RawConfigFile) -> String {
    match ConfigFile::try_from(raw) {
        Err(WatchError::ConfigError(msg)) => msg,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn minimal_config_uses_defaults() {
    let (_dir, path) = write_config(r#"hierarchies = ["src"]"#);

    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.watch.mode, WatchMode::Default);
    assert_eq!(cfg.watch.strategy, WatchStrategy::for_current_platform());
    assert_eq!(cfg.watch.max_hierarchies, 50);
    assert_eq!(cfg.watch.probe_file_name, ".vfswatch-probe");
    assert_eq!(cfg.watch.vfs_logging, VfsLogging::Normal);
    assert_eq!(
        cfg.watch_options().shutdown_timeout,
        Duration::from_secs(5)
    );
}

#[test]
fn relative_paths_resolve_against_the_config_directory() {
    let (dir, path) = write_config(
        r#"
hierarchies = ["src", "/abs/assets"]

[watch]
ignored_locations = [".cache"]
unsupported_file_systems = ["/mnt/nfs"]
"#,
    );

    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(
        cfg.hierarchies,
        vec![dir.path().join("src"), PathBuf::from("/abs/assets")]
    );
    assert_eq!(cfg.watch.ignored_locations, vec![dir.path().join(".cache")]);
    assert_eq!(cfg.watch.unsupported_file_systems, vec![PathBuf::from("/mnt/nfs")]);
    let options = cfg.watch_options();
    assert!(!options.watch_filter.should_watch(&dir.path().join(".cache/x")));
    assert!(options.watch_filter.should_watch(&dir.path().join("src/x")));
}

#[test]
fn all_watch_settings_are_read() {
    let (_dir, path) = write_config(
        r#"
hierarchies = ["/proj"]

[watch]
mode = "enabled"
strategy = "hierarchical"
max_hierarchies = 3
shutdown_timeout_ms = 250
probe_file_name = ".probe"
vfs_logging = "verbose"
"#,
    );

    let cfg = load_and_validate(&path).unwrap();
    let options = cfg.watch_options();

    assert_eq!(cfg.watch.mode, WatchMode::Enabled);
    assert_eq!(options.strategy, WatchStrategy::Hierarchical);
    assert_eq!(cfg.watch.max_hierarchies, 3);
    assert_eq!(options.shutdown_timeout, Duration::from_millis(250));
    assert_eq!(options.probe_file_name, ".probe");
    assert_eq!(cfg.watch.vfs_logging, VfsLogging::Verbose);
}

#[test]
fn unknown_mode_is_a_toml_error() {
    let (_dir, path) = write_config(
        r#"
hierarchies = ["/proj"]
[watch]
mode = "sometimes"
"#,
    );

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, WatchError::TomlError(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let err = load_and_validate(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, WatchError::IoError(_)));
}

#[test]
fn at_least_one_hierarchy_is_required() {
    let msg = config_error(ConfigFileBuilder::new().raw());
    assert!(msg.contains("hierarchies"));
}

#[test]
fn limits_must_be_positive() {
    let msg = config_error(
        ConfigFileBuilder::new()
            .with_hierarchy("/proj")
            .with_max_hierarchies(0)
            .raw(),
    );
    assert!(msg.contains("max_hierarchies"));

    let mut raw = ConfigFileBuilder::new().with_hierarchy("/proj").raw();
    raw.watch.shutdown_timeout_ms = 0;
    assert!(config_error(raw).contains("shutdown_timeout_ms"));
}

#[test]
fn probe_file_name_must_be_a_plain_name() {
    for name in ["sub/probe", "..", "", "/abs"] {
        let msg = config_error(
            ConfigFileBuilder::new()
                .with_hierarchy("/proj")
                .with_probe_file_name(name)
                .raw(),
        );
        assert!(msg.contains("probe_file_name"), "{name}: {msg}");
    }
}

#[test]
fn hierarchies_may_not_live_in_ignored_locations() {
    let msg = config_error(
        ConfigFileBuilder::new()
            .with_hierarchy("/proj/.cache/gen")
            .with_ignored_location("/proj/.cache")
            .raw(),
    );
    assert!(msg.contains("ignored"));
}

#[test]
fn builder_produces_a_valid_config() {
    let cfg = ConfigFileBuilder::new()
        .with_hierarchy("/proj")
        .with_mode(WatchMode::Disabled)
        .with_strategy(WatchStrategy::NonHierarchical)
        .build();

    assert_eq!(cfg.hierarchies, vec![PathBuf::from("/proj")]);
    assert_eq!(cfg.watch.mode, WatchMode::Disabled);
    assert_eq!(cfg.watch_options().strategy, WatchStrategy::NonHierarchical);
}
