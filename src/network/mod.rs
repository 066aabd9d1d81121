//! Host network collaborators.
//!
//! The aggregation pass only ever reads from the network through these
//! traits. `FileNetwork` binds them to a network description on disk.

pub mod file;

pub use file::FileNetwork;

use crate::error::UsageResult;
use crate::models::{TenantId, TenantInfo};
use serde_json::Value;
use std::rc::Rc;

/// Enumerates the sites of the network.
pub trait TenantDirectory {
    /// List at most `max` sites in directory order.
    ///
    /// Fails when the directory cannot be reached; callers must not treat a
    /// failure as an empty network.
    fn list_tenants(&self, max: usize) -> UsageResult<Vec<TenantInfo>>;
}

/// Per-site key-value option reads.
pub trait OptionStore {
    /// Read option `key` of site `tenant_id`. `None` when it was never stored.
    fn read_option(&self, tenant_id: TenantId, key: &str) -> Option<Value>;
}

/// Network-wide plugin activation state.
pub trait NetworkActivation {
    /// Returns true if `plugin_file` is activated for the whole network.
    fn is_network_active(&self, plugin_file: &str) -> bool;
}

impl<T: TenantDirectory + ?Sized> TenantDirectory for Rc<T> {
    fn list_tenants(&self, max: usize) -> UsageResult<Vec<TenantInfo>> {
        (**self).list_tenants(max)
    }
}

impl<T: OptionStore + ?Sized> OptionStore for Rc<T> {
    fn read_option(&self, tenant_id: TenantId, key: &str) -> Option<Value> {
        (**self).read_option(tenant_id, key)
    }
}

impl<T: NetworkActivation + ?Sized> NetworkActivation for Rc<T> {
    fn is_network_active(&self, plugin_file: &str) -> bool {
        (**self).is_network_active(plugin_file)
    }
}
