//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// plugin-usage - which sites of a multisite network run each plugin
///
/// Scans every site of the network once, caches the result for a week,
/// and answers usage queries from the cached snapshot.
///
/// Examples:
///   plugin-usage --network network.toml usage akismet/akismet.php
///   plugin-usage --network network.toml table --format html
///   plugin-usage --network network.toml event activated hello.php
///   plugin-usage --network network.toml clear
///   plugin-usage --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Network description file (TOML or JSON)
    #[arg(short, long, value_name = "FILE", env = "PLUGIN_USAGE_NETWORK")]
    pub network: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .plugin-usage.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum number of sites scanned per aggregation pass
    #[arg(long, value_name = "COUNT")]
    pub sites_limit: Option<usize>,

    /// Snapshot time-to-live in seconds
    #[arg(long, value_name = "SECS")]
    pub ttl: Option<u64>,

    /// Directory of the snapshot store
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keep snapshots in memory only (nothing survives this process)
    #[arg(long)]
    pub memory_cache: bool,

    /// Force debug mode on or off, overriding config and environment
    ///
    /// While debug mode is on every read rebuilds and nothing is cached.
    #[arg(long, value_name = "BOOL")]
    pub debug: Option<bool>,

    /// Generate a default .plugin-usage.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operations on the usage cache.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the sites running a plugin
    Usage {
        /// Plugin file, e.g. akismet/akismet.php
        plugin: String,

        /// Output format
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,
    },

    /// Render the usage column for every plugin seen on the network
    Table {
        /// Output format
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,

        /// Plugin list status filter (all, active, inactive, ...)
        #[arg(long, value_name = "STATUS")]
        plugin_status: Option<String>,

        /// Additional plugin files to include even if unused (comma-separated)
        #[arg(long, value_name = "FILES", value_delimiter = ',')]
        plugins: Vec<String>,

        /// Write the report to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Rebuild the snapshot now
    Refresh,

    /// Delete the stored snapshot without rebuilding
    Clear,

    /// Report a plugin activation or deactivation
    Event {
        /// What happened
        kind: EventKind,

        /// Plugin file affected
        plugin: String,
    },
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default, also accepted as `text`)
    #[default]
    #[value(alias = "text")]
    Markdown,
    /// JSON format
    Json,
    /// HTML table markup
    Html,
}

/// Plugin state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventKind {
    Activated,
    Deactivated,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.command.is_none() {
            return Err("A command is required (usage, table, refresh, clear, event)".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.sites_limit == Some(0) {
            return Err("Sites limit must be at least 1".to_string());
        }

        if self.ttl == Some(0) {
            return Err("TTL must be at least 1 second".to_string());
        }

        if let Some(Command::Usage { ref plugin, .. }) | Some(Command::Event { ref plugin, .. }) =
            self.command
        {
            if plugin.trim().is_empty() {
                return Err("Plugin file must not be empty".to_string());
            }
        }

        if let Some(ref network) = self.network {
            if !network.is_file() {
                return Err(format!(
                    "Network description does not exist: {}",
                    network.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the `[general] verbose` setting; `--quiet` wins.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
