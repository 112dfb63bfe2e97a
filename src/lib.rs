// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod snapshot;
pub mod types;
pub mod vfs;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::fs::{FileSystem, RealFileSystem};
use crate::snapshot::snapshot_location;
use crate::types::WatchMode;
use crate::vfs::WatchingVirtualFileSystem;
use crate::vfs::handlers::FileChange;
use crate::watch::{MountTableDetector, NotifyWatcherFactory};

/// Quiet period after the last reported change before the next build cycle.
const REBUILD_DEBOUNCE: Duration = Duration::from_millis(200);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the watching virtual file system
/// - build cycles (snapshot every hierarchy, then prune to what stays watched)
/// - change reporting on stdout
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let mode = match &args.mode {
        Some(raw) => raw.parse::<WatchMode>().map_err(anyhow::Error::msg)?,
        None => cfg.watch.mode,
    };

    if args.dry_run {
        print_dry_run(&cfg, mode);
        return Ok(());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let detector =
        MountTableDetector::new(Arc::clone(&fs), cfg.watch.unsupported_file_systems.clone());
    let vfs = WatchingVirtualFileSystem::new(
        Arc::clone(&fs),
        Arc::new(NotifyWatcherFactory),
        Arc::new(detector),
        cfg.watch_options(),
    );
    let mut changes = vfs.subscribe();

    run_build(&vfs, &cfg, mode, fs.as_ref()).await;

    if args.once {
        print_watched_roots(&vfs);
        vfs.close().await?;
        return Ok(());
    }

    let mut dirty = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                info!("shutdown requested");
                break;
            }
            change = changes.recv() => match change {
                Ok(change) => {
                    print_change(&change);
                    dirty = true;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change reporting fell behind");
                    dirty = true;
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::time::sleep(REBUILD_DEBOUNCE), if dirty => {
                dirty = false;
                run_build(&vfs, &cfg, mode, fs.as_ref()).await;
            }
        }
    }

    vfs.close().await?;
    Ok(())
}

/// One build cycle: snapshot every configured hierarchy that isn't cached yet.
async fn run_build(
    vfs: &WatchingVirtualFileSystem,
    cfg: &ConfigFile,
    mode: WatchMode,
    fs: &dyn FileSystem,
) {
    let watching = vfs.after_build_started(mode, cfg.watch.vfs_logging).await;
    debug!(watching, "build started");

    for hierarchy in &cfg.hierarchies {
        vfs.register_watchable_hierarchy(hierarchy);
        if vfs.root().find(hierarchy).is_some() {
            continue;
        }
        match snapshot_location(fs, hierarchy) {
            Ok(snapshot) => vfs.store(snapshot),
            Err(err) => warn!(?hierarchy, error = %err, "unable to snapshot hierarchy"),
        }
    }

    vfs.before_build_finished(mode, cfg.watch.vfs_logging, cfg.watch.max_hierarchies)
        .await;

    let retained = vfs.root().retained_statistics();
    info!(
        files = retained.regular_files,
        directories = retained.directories,
        missing = retained.missing_files,
        watched = vfs.watched_roots().len(),
        "build finished"
    );
}

fn print_change(change: &FileChange) {
    match change {
        FileChange::Changed { kind, path } => println!("{kind} {}", path.display()),
        FileChange::LostState => println!("LOST_STATE"),
    }
}

fn print_watched_roots(vfs: &WatchingVirtualFileSystem) {
    for root in vfs.watched_roots() {
        println!("watching {}", root.display());
    }
}

/// Simple dry-run output: print the resolved configuration.
fn print_dry_run(cfg: &ConfigFile, mode: WatchMode) {
    println!("vfswatch dry-run");
    println!("  watch.mode = {mode:?}");
    println!("  watch.strategy = {:?}", cfg.watch.strategy);
    println!("  watch.max_hierarchies = {}", cfg.watch.max_hierarchies);
    println!("  watch.shutdown_timeout_ms = {}", cfg.watch.shutdown_timeout_ms);
    println!("  watch.probe_file_name = {}", cfg.watch.probe_file_name);
    println!("  watch.vfs_logging = {:?}", cfg.watch.vfs_logging);
    if !cfg.watch.ignored_locations.is_empty() {
        println!("  watch.ignored_locations = {:?}", cfg.watch.ignored_locations);
    }
    if !cfg.watch.unsupported_file_systems.is_empty() {
        println!(
            "  watch.unsupported_file_systems = {:?}",
            cfg.watch.unsupported_file_systems
        );
    }
    println!();

    println!("hierarchies ({}):", cfg.hierarchies.len());
    for hierarchy in &cfg.hierarchies {
        println!("  - {}", hierarchy.display());
    }

    debug!("dry-run complete (nothing watched)");
}
