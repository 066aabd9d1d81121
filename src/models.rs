//! Data models for the plugin usage audit.
//!
//! This module contains the tenant records and the aggregate snapshot
//! produced by one aggregation pass over the network.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network-wide unique site identifier.
pub type TenantId = u64;

/// Base record of a site as reported by the tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantInfo {
    /// Site identifier.
    pub id: TenantId,
    /// Display name (blog name).
    pub name: String,
    /// Domain the site is served from.
    #[serde(default)]
    pub domain: String,
    /// Path of the site below the domain, always ending in `/`.
    #[serde(default = "default_path")]
    pub path: String,
    /// Whether the site is archived.
    #[serde(default)]
    pub archived: bool,
    /// Whether the site is flagged as deleted.
    #[serde(default)]
    pub deleted: bool,
}

fn default_path() -> String {
    "/".to_string()
}

/// A site together with its active plugins, as captured in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Site identifier.
    pub id: TenantId,
    /// Display name (blog name).
    pub name: String,
    /// Domain the site is served from.
    pub domain: String,
    /// Path of the site below the domain.
    pub path: String,
    /// Whether the site is archived.
    pub archived: bool,
    /// Whether the site is flagged as deleted.
    pub deleted: bool,
    /// Plugin files active on this site, in option order.
    pub active_plugins: Vec<String>,
}

impl TenantRecord {
    /// Build a record from directory data and the site's active plugins.
    pub fn from_info(info: TenantInfo, active_plugins: Vec<String>) -> Self {
        Self {
            id: info.id,
            name: info.name,
            domain: info.domain,
            path: info.path,
            archived: info.archived,
            deleted: info.deleted,
            active_plugins,
        }
    }

    /// Returns true if `plugin_file` is active on this site.
    pub fn runs(&self, plugin_file: &str) -> bool {
        self.active_plugins.iter().any(|p| p == plugin_file)
    }

    /// Link to the site's plugins admin page.
    pub fn admin_url(&self) -> String {
        let path = if self.path.ends_with('/') {
            self.path.clone()
        } else {
            format!("{}/", self.path)
        };
        format!("https://{}{}wp-admin/plugins.php", self.domain, path)
    }
}

/// The immutable result of one aggregation pass.
///
/// Tenants are kept in directory enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// When the aggregation pass finished.
    pub built_at: DateTime<Utc>,
    /// Tenant id to record, in enumeration order.
    pub tenants: IndexMap<TenantId, TenantRecord>,
}

impl AggregateSnapshot {
    /// Creates a snapshot from records already in enumeration order.
    pub fn new(built_at: DateTime<Utc>, records: Vec<TenantRecord>) -> Self {
        let tenants = records.into_iter().map(|r| (r.id, r)).collect();
        Self { built_at, tenants }
    }

    /// Number of tenants in the snapshot.
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// Returns true if the snapshot holds no tenants.
    #[allow(dead_code)] // Pairs with len()
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Every tenant running `plugin_file`, in snapshot order.
    pub fn tenants_running(&self, plugin_file: &str) -> Vec<(TenantId, TenantRecord)> {
        self.tenants
            .iter()
            .filter(|(_, record)| record.runs(plugin_file))
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }

    /// All distinct plugin files active anywhere, in first-seen order.
    pub fn known_plugins(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for record in self.tenants.values() {
            for plugin in &record.active_plugins {
                if !seen.contains(plugin) {
                    seen.push(plugin.clone());
                }
            }
        }
        seen
    }
}

/// Usage summary for one plugin across the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginUsage {
    /// Plugin file identifier.
    pub plugin_file: String,
    /// Whether the plugin is network activated.
    pub network_active: bool,
    /// Sites running the plugin (empty when network active).
    pub sites: Vec<TenantRecord>,
}

impl PluginUsage {
    /// Human readable usage label, matching the table column text.
    pub fn label(&self) -> String {
        if self.network_active {
            "Network Active".to_string()
        } else if self.sites.is_empty() {
            "Not Active".to_string()
        } else {
            active_on_label(self.sites.len())
        }
    }
}

/// "Active on N site(s)" with correct pluralization.
pub fn active_on_label(count: usize) -> String {
    if count == 1 {
        "Active on 1 site".to_string()
    } else {
        format!("Active on {} sites", count)
    }
}

impl fmt::Display for TenantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)?;
        if self.archived {
            write!(f, ", Archived")?;
        }
        if self.deleted {
            write!(f, ", Deleted")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: TenantId, plugins: &[&str]) -> TenantRecord {
        TenantRecord {
            id,
            name: format!("Site {}", id),
            domain: "example.com".to_string(),
            path: format!("/site{}/", id),
            archived: false,
            deleted: false,
            active_plugins: plugins.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_tenants_running_preserves_order() {
        let snapshot = AggregateSnapshot::new(
            Utc::now(),
            vec![
                record(1, &["a.php"]),
                record(2, &[]),
                record(3, &["a.php", "b.php"]),
            ],
        );

        let ids: Vec<TenantId> = snapshot
            .tenants_running("a.php")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(snapshot.tenants_running("A.php").is_empty());
    }

    #[test]
    fn test_known_plugins_first_seen_order() {
        let snapshot = AggregateSnapshot::new(
            Utc::now(),
            vec![record(1, &["b.php", "a.php"]), record(2, &["a.php", "c.php"])],
        );
        assert_eq!(snapshot.known_plugins(), vec!["b.php", "a.php", "c.php"]);
    }

    #[test]
    fn test_admin_url() {
        let mut r = record(4, &[]);
        assert_eq!(r.admin_url(), "https://example.com/site4/wp-admin/plugins.php");

        r.path = "/blog".to_string();
        assert_eq!(r.admin_url(), "https://example.com/blog/wp-admin/plugins.php");
    }

    #[test]
    fn test_snapshot_json_keeps_order() {
        let snapshot = AggregateSnapshot::new(
            Utc::now(),
            vec![record(30, &["x.php"]), record(2, &[]), record(11, &[])],
        );

        let blob = serde_json::to_string(&snapshot).unwrap();
        let decoded: AggregateSnapshot = serde_json::from_str(&blob).unwrap();

        assert_eq!(decoded, snapshot);
        let ids: Vec<_> = decoded.tenants.keys().copied().collect();
        assert_eq!(ids, vec![30, 2, 11]);
    }

    #[test]
    fn test_usage_label() {
        let mut usage = PluginUsage {
            plugin_file: "a.php".to_string(),
            network_active: false,
            sites: vec![],
        };
        assert_eq!(usage.label(), "Not Active");

        usage.sites.push(record(1, &["a.php"]));
        assert_eq!(usage.label(), "Active on 1 site");

        usage.sites.push(record(2, &["a.php"]));
        assert_eq!(usage.label(), "Active on 2 sites");

        usage.network_active = true;
        assert_eq!(usage.label(), "Network Active");
    }
}
