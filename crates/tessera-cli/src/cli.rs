//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `tessera`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tessera",
    version,
    about = "Fetch, verify and install versioned resource bundles.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TESSERA_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Bring every bundle in the manifest up to date under `--out`.
    Sync(SyncArgs),

    /// Parse and validate the manifest, print the install order.
    Check {
        /// Bundle manifest (TOML).
        #[arg(long, value_name = "PATH", default_value = "bundles.toml")]
        manifest: PathBuf,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct SyncArgs {
    /// Bundle manifest (TOML).
    #[arg(long, value_name = "PATH", default_value = "bundles.toml")]
    pub manifest: PathBuf,

    /// Directory bundles are installed into.
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Scheduler config file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Overrides `max_concurrency` from the config file.
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Start as a background host: downloads only run if the config allows
    /// background execution.
    #[arg(long)]
    pub background: bool,
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
