//! Per-site plugin aggregation.
//!
//! One pass enumerates the network's sites and reads each site's
//! `active_plugins` option into a single snapshot.

use crate::error::UsageResult;
use crate::models::{AggregateSnapshot, TenantRecord};
use crate::network::{OptionStore, TenantDirectory};
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

/// Default number of sites enumerated per pass.
pub const DEFAULT_SITES_LIMIT: usize = 10_000;

/// Default option key holding a site's active plugins.
pub const ACTIVE_PLUGINS_OPTION: &str = "active_plugins";

/// Builds aggregate snapshots from the network collaborators.
pub struct Aggregator {
    directory: Box<dyn TenantDirectory>,
    options: Box<dyn OptionStore>,
    option_key: String,
}

impl Aggregator {
    /// Create an aggregator reading the default `active_plugins` option.
    pub fn new(directory: Box<dyn TenantDirectory>, options: Box<dyn OptionStore>) -> Self {
        Self {
            directory,
            options,
            option_key: ACTIVE_PLUGINS_OPTION.to_string(),
        }
    }

    /// Read active plugins from a different option key.
    pub fn with_option_key(mut self, key: impl Into<String>) -> Self {
        self.option_key = key.into();
        self
    }

    /// Run one full aggregation pass over at most `tenant_limit` sites.
    ///
    /// Fails as a whole if the directory cannot be enumerated.
    pub fn build(&self, tenant_limit: usize) -> UsageResult<AggregateSnapshot> {
        let start = Instant::now();

        let mut tenants = self.directory.list_tenants(tenant_limit)?;
        if tenants.len() > tenant_limit {
            debug!(
                "Directory returned {} sites for a limit of {}, truncating",
                tenants.len(),
                tenant_limit
            );
            tenants.truncate(tenant_limit);
        }

        let records: Vec<TenantRecord> = tenants
            .into_iter()
            .map(|info| {
                let active = active_plugins(self.options.read_option(info.id, &self.option_key));
                TenantRecord::from_info(info, active)
            })
            .collect();

        let snapshot = AggregateSnapshot::new(Utc::now(), records);
        info!(
            "Aggregated {} sites in {:.2}s",
            snapshot.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(snapshot)
    }
}

/// Extract the plugin list from a raw option value.
///
/// Absent, falsy or non-list values mean no active plugins. Keyed lists
/// keep the order their entries were stored in.
pub fn active_plugins(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(plugin) => Some(plugin),
                other => {
                    debug!("Skipping non-string plugin entry: {}", other);
                    None
                }
            })
            .collect(),
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(_, item)| match item {
                Value::String(plugin) => Some(plugin),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
