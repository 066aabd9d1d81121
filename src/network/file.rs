//! File-backed network description.
//!
//! Reads a TOML (or JSON, by extension) file listing the network's sites and
//! their options. The file is re-read at the start of every enumeration so
//! each aggregation pass sees the current state on disk.

use super::{NetworkActivation, OptionStore, TenantDirectory};
use crate::error::{UsageError, UsageResult};
use crate::models::{TenantId, TenantInfo};
use serde::Deserialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parsed network description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkDescription {
    /// Plugins activated for the whole network.
    #[serde(default)]
    pub network_active: Vec<String>,

    /// Sites in directory order.
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

/// One site entry of the description.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub id: TenantId,
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub deleted: bool,
    /// Site options, e.g. `active_plugins`.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

fn default_path() -> String {
    "/".to_string()
}

impl SiteEntry {
    fn info(&self) -> TenantInfo {
        TenantInfo {
            id: self.id,
            name: self.name.clone(),
            domain: self.domain.clone(),
            path: self.path.clone(),
            archived: self.archived,
            deleted: self.deleted,
        }
    }
}

impl NetworkDescription {
    /// Parse a description, choosing the format from the file extension.
    pub fn parse(path: &Path, content: &str) -> UsageResult<Self> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let parsed = if is_json {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else {
            toml::from_str(content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| UsageError::Network {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// Option lookups for the most recently loaded description.
#[derive(Debug, Default)]
struct LoadedNetwork {
    network_active: Vec<String>,
    options: HashMap<TenantId, BTreeMap<String, Value>>,
}

impl From<NetworkDescription> for LoadedNetwork {
    fn from(description: NetworkDescription) -> Self {
        let mut options = HashMap::with_capacity(description.sites.len());
        for site in description.sites {
            // First entry wins for duplicated ids.
            options.entry(site.id).or_insert(site.options);
        }
        Self {
            network_active: description.network_active,
            options,
        }
    }
}

/// Network collaborators backed by a description file.
pub struct FileNetwork {
    path: PathBuf,
    current: RefCell<LoadedNetwork>,
}

impl FileNetwork {
    /// Open the description at `path`, reading it once up front.
    pub fn open(path: impl Into<PathBuf>) -> UsageResult<Self> {
        let path = path.into();
        let description = Self::read(&path)?;
        Ok(Self {
            path,
            current: RefCell::new(description.into()),
        })
    }

    /// Wrap an in-memory description. Enumeration will still try to reload
    /// from `path`.
    #[allow(dead_code)] // Used by tests and embedders
    pub fn from_description(path: impl Into<PathBuf>, description: NetworkDescription) -> Self {
        Self {
            path: path.into(),
            current: RefCell::new(description.into()),
        }
    }

    fn read(path: &Path) -> UsageResult<NetworkDescription> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UsageError::DirectoryUnavailable(format!("{}: {}", path.display(), e))
        })?;
        NetworkDescription::parse(path, &content)
    }
}

impl TenantDirectory for FileNetwork {
    fn list_tenants(&self, max: usize) -> UsageResult<Vec<TenantInfo>> {
        let description = Self::read(&self.path)?;
        debug!(
            "Loaded {} sites from {}",
            description.sites.len(),
            self.path.display()
        );

        let tenants = description.sites.iter().take(max).map(SiteEntry::info).collect();
        *self.current.borrow_mut() = description.into();
        Ok(tenants)
    }
}

impl OptionStore for FileNetwork {
    fn read_option(&self, tenant_id: TenantId, key: &str) -> Option<Value> {
        self.current
            .borrow()
            .options
            .get(&tenant_id)
            .and_then(|options| options.get(key).cloned())
    }
}

impl NetworkActivation for FileNetwork {
    fn is_network_active(&self, plugin_file: &str) -> bool {
        self.current
            .borrow()
            .network_active
            .iter()
            .any(|p| p == plugin_file)
    }
}
