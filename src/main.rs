//! plugin-usage - multisite plugin usage audit
//!
//! A CLI tool that records which sites of a multisite network have each
//! plugin active, caches that aggregate, and renders the plugins table
//! usage column from it.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid arguments, unreadable network, store failure, etc.)

mod analysis;
mod cache;
mod cli;
mod config;
mod error;
mod hooks;
mod models;
mod network;
mod report;

use anyhow::{Context, Result};
use cache::{DebugMode, FileStore, MemoryStore, SnapshotStore, UsageCache};
use cli::{Args, Command, EventKind, OutputFormat};
use config::Config;
use hooks::{HostEvent, UsageHooks};
use indicatif::{ProgressBar, ProgressStyle};
use network::{FileNetwork, NetworkActivation};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so [general] verbose can raise the log level
    let (config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&args, config.general.verbose);

    info!("plugin-usage v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {}", config_source);

    if let Err(e) = run(args, config) {
        error!("Command failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .plugin-usage.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Edit it to point at your network and tune the cache.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = args.log_level(config_verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run one command as a single unit of work.
fn run(args: Args, mut config: Config) -> Result<()> {
    config.merge_with_args(&args);

    let network_path = config
        .general
        .network
        .as_ref()
        .map(PathBuf::from)
        .context("No network description given (use --network or [general] network)")?;

    let network = Rc::new(
        FileNetwork::open(&network_path)
            .with_context(|| format!("Failed to open network {}", network_path.display()))?,
    );

    let mut cache = build_cache(&args, &config, Rc::clone(&network));
    let mut hooks = UsageHooks::new();

    let Some(command) = args.command.clone() else {
        return Ok(());
    };

    hooks.within_unit(&mut cache, |hooks, cache| {
        execute(&args, command, &network, hooks, cache)
    })
}

/// Execute one subcommand. Deferred work is flushed by the caller.
fn execute(
    args: &Args,
    command: Command,
    network: &FileNetwork,
    hooks: &mut UsageHooks,
    cache: &mut UsageCache,
) -> Result<()> {
    match command {
        Command::Usage { plugin, format } => {
            hooks.dispatch(HostEvent::PluginsPageLoad, cache)?;
            print_notices(hooks);

            let sites = with_spinner(args, "Loading plugin usage...", || {
                cache.find_tenants_running(&plugin)
            })?;
            let network_active = network.is_network_active(&plugin);
            let usage = models::PluginUsage {
                plugin_file: plugin.clone(),
                network_active,
                sites: if network_active {
                    Vec::new()
                } else {
                    sites.iter().map(|(_, record)| record.clone()).collect()
                },
            };

            let output = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&usage)?,
                OutputFormat::Html => report::column::render_usage_cell(
                    report::column::COLUMN,
                    &plugin,
                    usage.network_active,
                    &sites,
                ),
                OutputFormat::Markdown => {
                    let mut lines = vec![format!("`{}`: {}", plugin, usage.label())];
                    lines.extend(usage.sites.iter().map(|site| format!("- {}", site)));
                    lines.join("\n")
                }
            };
            println!("{}", output);
        }
        Command::Table {
            format,
            plugin_status,
            plugins,
            output,
        } => {
            hooks.dispatch(HostEvent::PluginsPageLoad, cache)?;
            print_notices(hooks);

            let snapshot = with_spinner(args, "Loading plugin usage...", || {
                cache.get_snapshot(false)
            })?;
            let usage = report::usage_report(&snapshot, network, &plugins);

            let content = match format {
                OutputFormat::Markdown => report::generate_markdown_report(&snapshot, &usage),
                OutputFormat::Json => report::generate_json_report(&usage)?,
                OutputFormat::Html => {
                    report::generate_html_report(&usage, plugin_status.as_deref())
                }
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, &content)
                        .with_context(|| format!("Failed to write report to {}", path.display()))?;
                    println!("✅ Report saved to: {}", path.display());
                }
                None => print!("{}", content),
            }
        }
        Command::Refresh => {
            let snapshot = with_spinner(args, "Scanning network...", || {
                cache.get_snapshot(true)
            })?;
            println!(
                "✅ Snapshot rebuilt: {} sites, {} plugins in use.",
                snapshot.len(),
                snapshot.known_plugins().len()
            );
            if cache.is_debug() {
                println!("   Debug mode is on: the snapshot was not cached.");
            }
        }
        Command::Clear => {
            cache.invalidate()?;
            println!("✅ Stored snapshot cleared.");
        }
        Command::Event { kind, plugin } => {
            let event = match kind {
                EventKind::Activated => HostEvent::PluginActivated(plugin.clone()),
                EventKind::Deactivated => HostEvent::PluginDeactivated(plugin.clone()),
            };
            hooks.dispatch(event, cache)?;
            println!(
                "📌 {:?} {} recorded; snapshot will be invalidated when this run ends.",
                kind, plugin
            );
        }
    }

    Ok(())
}

/// Wire the usage cache to the network and the configured store.
fn build_cache(args: &Args, config: &Config, network: Rc<FileNetwork>) -> UsageCache {
    let aggregator = analysis::Aggregator::new(Box::new(Rc::clone(&network)), Box::new(network))
        .with_option_key(config.aggregation.option_key.clone());

    let store: Box<dyn SnapshotStore> = if args.memory_cache {
        debug!("Using in-memory snapshot store");
        Box::new(MemoryStore::new())
    } else {
        debug!("Using snapshot store at {}", config.cache.dir);
        Box::new(FileStore::new(&config.cache.dir))
    };

    let mut debug_mode = DebugMode::new(config.base_debug());
    if let Some(forced) = args.debug {
        debug_mode = debug_mode.with_filter(move |_| forced);
    }

    UsageCache::new(aggregator, store, Box::new(debug_mode), config.cache_settings())
}

/// Run `work` behind a spinner unless output is quiet.
fn with_spinner<T>(args: &Args, message: &str, work: impl FnOnce() -> T) -> T {
    if args.quiet {
        return work();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = work();
    spinner.finish_and_clear();
    result
}

fn print_notices(hooks: &UsageHooks) {
    for notice in hooks.notices() {
        eprintln!("ℹ️  {}", notice);
    }
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is installed, so it returns a description of where
/// the configuration came from instead of logging it.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, format!("loaded from {}", config_path.display())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, format!("loaded from {}", config::CONFIG_FILE))),
        Ok(None) => Ok((Config::default(), "no config file found, using defaults".to_string())),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}", e);
            Ok((Config::default(), "using defaults".to_string()))
        }
    }
}
