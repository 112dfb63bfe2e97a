// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `vfswatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vfswatch",
    version,
    about = "Snapshot file hierarchies and keep them valid by watching the file system.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Vfswatch.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Vfswatch.toml")]
    pub config: String,

    /// Run a single build cycle and exit, no change reporting.
    #[arg(long)]
    pub once: bool,

    /// Override `[watch].mode` (default, enabled, disabled).
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `VFSWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved configuration, but don't watch anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
