//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.plugin-usage.toml` files.

use crate::analysis::{ACTIVE_PLUGINS_OPTION, DEFAULT_SITES_LIMIT};
use crate::cache::usage::{parse_bool_flag, CacheSettings, DEFAULT_CACHE_KEY, DEFAULT_TTL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".plugin-usage.toml";

/// Environment variable holding the base debug flag.
pub const DEBUG_ENV: &str = "PLUGIN_USAGE_DEBUG";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Snapshot cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Network description file.
    #[serde(default)]
    pub network: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Aggregation pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Maximum number of sites enumerated per pass.
    #[serde(default = "default_sites_limit")]
    pub sites_limit: usize,

    /// Site option holding the active plugin list.
    #[serde(default = "default_option_key")]
    pub option_key: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            sites_limit: default_sites_limit(),
            option_key: default_option_key(),
        }
    }
}

fn default_sites_limit() -> usize {
    DEFAULT_SITES_LIMIT
}

fn default_option_key() -> String {
    ACTIVE_PLUGINS_OPTION.to_string()
}

/// Snapshot cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Store key of the snapshot.
    #[serde(default = "default_key")]
    pub key: String,

    /// Snapshot time-to-live in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Directory of the file-backed snapshot store.
    #[serde(default = "default_dir")]
    pub dir: String,

    /// Disable caching entirely.
    #[serde(default)]
    pub debug: bool,

    /// Serve the last good snapshot when a rebuild fails.
    #[serde(default = "default_true")]
    pub serve_stale_on_error: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            ttl_seconds: default_ttl_seconds(),
            dir: default_dir(),
            debug: false,
            serve_stale_on_error: true,
        }
    }
}

fn default_key() -> String {
    DEFAULT_CACHE_KEY.to_string()
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL.as_secs()
}

fn default_dir() -> String {
    ".plugin-usage-cache".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref network) = args.network {
            self.general.network = Some(network.display().to_string());
        }

        if let Some(limit) = args.sites_limit {
            self.aggregation.sites_limit = limit;
        }

        if let Some(ttl) = args.ttl {
            self.cache.ttl_seconds = ttl;
        }

        if let Some(ref dir) = args.cache_dir {
            self.cache.dir = dir.display().to_string();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Base debug flag: the config value, or the environment switch.
    pub fn base_debug(&self) -> bool {
        self.cache.debug
            || std::env::var(DEBUG_ENV)
                .map(|v| parse_bool_flag(&v))
                .unwrap_or(false)
    }

    /// Settings for the usage cache.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            key: self.cache.key.clone(),
            ttl: Duration::from_secs(self.cache.ttl_seconds),
            sites_limit: self.aggregation.sites_limit,
            serve_stale_on_error: self.cache.serve_stale_on_error,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
