//! Cached plugin usage read model.
//!
//! `UsageCache` owns a single snapshot slot backed by a `SnapshotStore`.
//! Snapshots are rebuilt lazily when missing, older than the configured
//! TTL, explicitly invalidated, or when debug mode is on.

use super::store::SnapshotStore;
use crate::analysis::Aggregator;
use crate::error::{UsageError, UsageResult};
use crate::models::{AggregateSnapshot, TenantId, TenantRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Store key of the persisted snapshot.
pub const DEFAULT_CACHE_KEY: &str = "blogs_plugins";

/// One week.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Stored snapshots outlive their TTL by this factor so a stale copy stays
/// available as a fallback. Freshness is judged from `built_at`.
pub const RETENTION_FACTOR: u32 = 4;

/// Admin notice shown on the plugins page while debug mode disables caching.
pub const DEBUG_NOTICE: &str =
    "Plugin usage information is not cached while debug mode is enabled.";

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Provides the debug flag.
pub trait DebugFlag {
    fn is_debug(&self) -> bool;
}

/// Debug flag with an optional single override filter.
///
/// The filter receives the base value and returns the effective one.
pub struct DebugMode {
    base: bool,
    filter: Option<Box<dyn Fn(bool) -> bool>>,
}

impl DebugMode {
    pub fn new(base: bool) -> Self {
        Self { base, filter: None }
    }

    /// Install the override filter, replacing any previous one.
    pub fn with_filter(mut self, filter: impl Fn(bool) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }
}

impl DebugFlag for DebugMode {
    fn is_debug(&self) -> bool {
        match &self.filter {
            Some(filter) => filter(self.base),
            None => self.base,
        }
    }
}

/// Interpret a loosely typed boolean setting ("1", "true", "on", "yes").
pub fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Tunables of the usage cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Store key of the snapshot.
    pub key: String,
    /// Maximum snapshot age.
    pub ttl: Duration,
    /// Maximum number of sites per aggregation pass.
    pub sites_limit: usize,
    /// Return the last good snapshot when a rebuild fails.
    pub serve_stale_on_error: bool,
}

impl CacheSettings {
    /// How long the store keeps a snapshot.
    pub fn retention(&self) -> Duration {
        self.ttl.saturating_mul(RETENTION_FACTOR)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            key: DEFAULT_CACHE_KEY.to_string(),
            ttl: DEFAULT_TTL,
            sites_limit: crate::analysis::DEFAULT_SITES_LIMIT,
            serve_stale_on_error: true,
        }
    }
}

/// Cached aggregate of plugin usage across the network.
pub struct UsageCache {
    aggregator: Aggregator,
    store: Box<dyn SnapshotStore>,
    debug: Box<dyn DebugFlag>,
    clock: Box<dyn Clock>,
    settings: CacheSettings,
    slot: Option<Arc<AggregateSnapshot>>,
    builds: usize,
}

impl UsageCache {
    pub fn new(
        aggregator: Aggregator,
        store: Box<dyn SnapshotStore>,
        debug: Box<dyn DebugFlag>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            aggregator,
            store,
            debug,
            clock: Box::new(SystemClock),
            settings,
            slot: None,
            builds: 0,
        }
    }

    /// Replace the clock used for freshness checks.
    #[allow(dead_code)] // Injected by tests and embedders
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of aggregation passes this cache has run.
    #[allow(dead_code)] // Diagnostics
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// Returns true if debug mode currently bypasses the cache.
    pub fn is_debug(&self) -> bool {
        self.debug.is_debug()
    }

    /// Return a snapshot no older than the TTL, rebuilding when needed.
    pub fn get_snapshot(&mut self, force_refresh: bool) -> UsageResult<Arc<AggregateSnapshot>> {
        let debug_mode = self.debug.is_debug();

        if !force_refresh && !debug_mode {
            if let Some(snapshot) = self.cached()? {
                return Ok(snapshot);
            }
        }

        debug!(
            force = force_refresh,
            debug = debug_mode,
            "Rebuilding usage snapshot"
        );

        let snapshot = match self.aggregator.build(self.settings.sites_limit) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => return self.fallback(e),
        };
        self.builds += 1;

        if debug_mode {
            self.store.delete(&self.settings.key)?;
            self.slot = None;
        } else {
            let blob = serde_json::to_string(snapshot.as_ref())?;
            self.store
                .set(&self.settings.key, &blob, self.settings.retention())?;
            self.slot = Some(Arc::clone(&snapshot));
        }

        Ok(snapshot)
    }

    /// Drop the stored snapshot. The next read rebuilds.
    pub fn invalidate(&mut self) -> UsageResult<()> {
        self.slot = None;
        self.store.delete(&self.settings.key)?;
        info!("Usage snapshot invalidated");
        Ok(())
    }

    /// Every site running `plugin_file`, in directory order.
    pub fn find_tenants_running(
        &mut self,
        plugin_file: &str,
    ) -> UsageResult<Vec<(TenantId, TenantRecord)>> {
        let snapshot = self.get_snapshot(false)?;
        Ok(snapshot.tenants_running(plugin_file))
    }

    /// Plugins page load hook: under debug mode clear the stored snapshot and
    /// return the notice to display.
    pub fn debug_notice(&mut self) -> UsageResult<Option<&'static str>> {
        if !self.debug.is_debug() {
            return Ok(None);
        }
        self.invalidate()?;
        Ok(Some(DEBUG_NOTICE))
    }

    /// Current snapshot from the slot or the store, if still fresh.
    fn cached(&mut self) -> UsageResult<Option<Arc<AggregateSnapshot>>> {
        if let Some(snapshot) = &self.slot {
            if self.is_fresh(snapshot) {
                return Ok(Some(Arc::clone(snapshot)));
            }
            debug!("In-memory snapshot from {} is stale", snapshot.built_at);
        }

        match self.load_stored()? {
            Some(snapshot) if self.is_fresh(&snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.slot = Some(Arc::clone(&snapshot));
                Ok(Some(snapshot))
            }
            Some(snapshot) => {
                // Kept as the last good snapshot in case the rebuild fails.
                debug!("Stored snapshot from {} is stale", snapshot.built_at);
                self.slot = Some(Arc::new(snapshot));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn load_stored(&self) -> UsageResult<Option<AggregateSnapshot>> {
        let Some(blob) = self.store.get(&self.settings.key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&blob) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!("Ignoring undecodable snapshot '{}': {}", self.settings.key, e);
                Ok(None)
            }
        }
    }

    fn is_fresh(&self, snapshot: &AggregateSnapshot) -> bool {
        let age = self.clock.now().signed_duration_since(snapshot.built_at);
        match age.to_std() {
            Ok(age) => age <= self.settings.ttl,
            // Built "in the future" relative to our clock.
            Err(_) => true,
        }
    }

    /// Handle a failed rebuild: serve the last good snapshot if allowed.
    fn fallback(&mut self, error: UsageError) -> UsageResult<Arc<AggregateSnapshot>> {
        if !self.settings.serve_stale_on_error {
            return Err(error);
        }

        let last_good = match &self.slot {
            Some(snapshot) => Some(Arc::clone(snapshot)),
            None => self.load_stored().ok().flatten().map(Arc::new),
        };

        match last_good {
            Some(snapshot) => {
                warn!(
                    "Aggregation failed ({}), serving snapshot from {}",
                    error, snapshot.built_at
                );
                Ok(snapshot)
            }
            None => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{FileStore, MemoryStore};
    use crate::models::TenantInfo;
    use crate::network::{OptionStore, TenantDirectory};
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Directory whose calls are counted and whose availability can be toggled.
    struct CountingDirectory {
        ids: Vec<TenantId>,
        calls: Rc<Cell<usize>>,
        offline: Rc<Cell<bool>>,
    }

    impl TenantDirectory for CountingDirectory {
        fn list_tenants(&self, max: usize) -> UsageResult<Vec<TenantInfo>> {
            self.calls.set(self.calls.get() + 1);
            if self.offline.get() {
                return Err(UsageError::DirectoryUnavailable("down".to_string()));
            }
            Ok(self
                .ids
                .iter()
                .take(max)
                .map(|&id| TenantInfo {
                    id,
                    name: format!("Site {}", id),
                    domain: "example.com".to_string(),
                    path: "/".to_string(),
                    archived: false,
                    deleted: false,
                })
                .collect())
        }
    }

    struct MapOptions(HashMap<TenantId, Value>);

    impl OptionStore for MapOptions {
        fn read_option(&self, tenant_id: TenantId, _key: &str) -> Option<Value> {
            self.0.get(&tenant_id).cloned()
        }
    }

    /// Store handle shared between the cache and the test.
    #[derive(Clone, Default)]
    struct SharedStore(Rc<MemoryStore>);

    impl SnapshotStore for SharedStore {
        fn get(&self, key: &str) -> UsageResult<Option<String>> {
            self.0.get(key)
        }
        fn set(&self, key: &str, blob: &str, ttl: Duration) -> UsageResult<()> {
            self.0.set(key, blob, ttl)
        }
        fn delete(&self, key: &str) -> UsageResult<()> {
            self.0.delete(key)
        }
    }

    struct ManualClock(Rc<Cell<DateTime<Utc>>>);

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.get()
        }
    }

    struct Harness {
        cache: UsageCache,
        calls: Rc<Cell<usize>>,
        offline: Rc<Cell<bool>>,
        store: SharedStore,
        now: Rc<Cell<DateTime<Utc>>>,
    }

    fn harness(debug: bool) -> Harness {
        harness_with(debug, CacheSettings::default())
    }

    fn harness_with(debug: bool, settings: CacheSettings) -> Harness {
        let calls = Rc::new(Cell::new(0));
        let offline = Rc::new(Cell::new(false));
        let store = SharedStore::default();
        let now = Rc::new(Cell::new(Utc::now()));

        let directory = CountingDirectory {
            ids: vec![1, 2, 3],
            calls: Rc::clone(&calls),
            offline: Rc::clone(&offline),
        };
        let options = MapOptions(HashMap::from([
            (1, json!(["a.php"])),
            (2, json!([])),
            (3, json!(["a.php", "b.php"])),
        ]));

        let cache = UsageCache::new(
            Aggregator::new(Box::new(directory), Box::new(options)),
            Box::new(store.clone()),
            Box::new(DebugMode::new(debug)),
            settings,
        )
        .with_clock(Box::new(ManualClock(Rc::clone(&now))));

        Harness {
            cache,
            calls,
            offline,
            store,
            now,
        }
    }

    #[test]
    fn test_repeat_reads_within_ttl_build_once() {
        let mut h = harness(false);

        let first = h.cache.get_snapshot(false).unwrap();
        let second = h.cache.get_snapshot(false).unwrap();

        assert_eq!(h.calls.get(), 1);
        assert_eq!(h.cache.builds(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(h.store.0.contains(DEFAULT_CACHE_KEY));
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let mut h = harness(false);

        h.cache.get_snapshot(false).unwrap();
        h.cache.invalidate().unwrap();
        assert!(!h.store.0.contains(DEFAULT_CACHE_KEY));
        assert_eq!(h.calls.get(), 1);

        h.cache.get_snapshot(false).unwrap();
        assert_eq!(h.calls.get(), 2);
    }

    #[test]
    fn test_force_refresh_rebuilds() {
        let mut h = harness(false);

        h.cache.get_snapshot(false).unwrap();
        h.cache.get_snapshot(true).unwrap();
        assert_eq!(h.calls.get(), 2);
    }

    #[test]
    fn test_ttl_expiry_rebuilds() {
        let mut h = harness(false);

        h.cache.get_snapshot(false).unwrap();
        h.now.set(h.now.get() + chrono::Duration::days(6));
        h.cache.get_snapshot(false).unwrap();
        assert_eq!(h.calls.get(), 1);

        h.now.set(h.now.get() + chrono::Duration::days(2));
        h.cache.get_snapshot(false).unwrap();
        assert_eq!(h.calls.get(), 2);
    }

    #[test]
    fn test_debug_mode_bypasses_store() {
        let mut h = harness(true);

        h.cache.get_snapshot(false).unwrap();
        h.cache.get_snapshot(false).unwrap();

        assert_eq!(h.calls.get(), 2);
        assert!(!h.store.0.contains(DEFAULT_CACHE_KEY));
    }

    #[test]
    fn test_debug_filter_overrides_base() {
        let flag = DebugMode::new(true).with_filter(|_| false);
        assert!(!flag.is_debug());

        let flag = DebugMode::new(false).with_filter(|base| !base);
        assert!(flag.is_debug());
    }

    #[test]
    fn test_debug_notice_clears_store() {
        let mut h = harness(false);
        h.cache.get_snapshot(false).unwrap();
        assert_eq!(h.cache.debug_notice().unwrap(), None);
        assert!(h.store.0.contains(DEFAULT_CACHE_KEY));

        let mut h = harness(true);
        h.store.set(DEFAULT_CACHE_KEY, "{}", DEFAULT_TTL).unwrap();
        assert_eq!(h.cache.debug_notice().unwrap(), Some(DEBUG_NOTICE));
        assert!(!h.store.0.contains(DEFAULT_CACHE_KEY));
    }

    #[test]
    fn test_snapshot_shared_through_store() {
        let mut h = harness(false);
        h.cache.get_snapshot(false).unwrap();

        // A second cache over the same store reads the persisted snapshot.
        let calls = Rc::new(Cell::new(0));
        let directory = CountingDirectory {
            ids: vec![1],
            calls: Rc::clone(&calls),
            offline: Rc::new(Cell::new(false)),
        };
        let mut other = UsageCache::new(
            Aggregator::new(Box::new(directory), Box::new(MapOptions(HashMap::new()))),
            Box::new(h.store.clone()),
            Box::new(DebugMode::new(false)),
            CacheSettings::default(),
        );

        let snapshot = other.get_snapshot(false).unwrap();
        assert_eq!(calls.get(), 0);
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_find_tenants_running() {
        let mut h = harness(false);

        let found = h.cache.find_tenants_running("a.php").unwrap();
        let ids: Vec<_> = found.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(found[1].1.active_plugins, vec!["a.php", "b.php"]);

        assert!(h.cache.find_tenants_running("c.php").unwrap().is_empty());
        assert_eq!(h.calls.get(), 1);
    }

    #[test]
    fn test_failed_rebuild_serves_last_good() {
        let mut h = harness(false);
        let good = h.cache.get_snapshot(false).unwrap();

        h.offline.set(true);
        let served = h.cache.get_snapshot(true).unwrap();
        assert!(Arc::ptr_eq(&good, &served));
        assert_eq!(h.cache.builds(), 1);
    }

    #[test]
    fn test_failed_rebuild_without_fallback_errors() {
        let settings = CacheSettings {
            serve_stale_on_error: false,
            ..CacheSettings::default()
        };
        let mut h = harness_with(false, settings);
        h.cache.get_snapshot(false).unwrap();

        h.offline.set(true);
        assert!(matches!(
            h.cache.get_snapshot(true),
            Err(UsageError::DirectoryUnavailable(_))
        ));
    }

    #[test]
    fn test_failed_first_build_stores_nothing() {
        let mut h = harness(false);
        h.offline.set(true);

        assert!(h.cache.get_snapshot(false).is_err());
        assert!(!h.store.0.contains(DEFAULT_CACHE_KEY));
    }

    #[test]
    fn test_stale_store_entry_used_as_fallback() {
        let mut h = harness(false);
        h.cache.get_snapshot(false).unwrap();
        h.cache.slot = None;

        h.offline.set(true);
        h.now.set(h.now.get() + chrono::Duration::days(30));
        let served = h.cache.get_snapshot(false).unwrap();
        assert_eq!(served.len(), 3);
    }

    #[test]
    fn test_expired_file_snapshot_served_when_directory_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = CacheSettings {
            ttl: Duration::from_secs(60),
            ..CacheSettings::default()
        };

        let mut h = harness_with(false, settings.clone());
        let good = h.cache.get_snapshot(false).unwrap();
        let blob = serde_json::to_string(good.as_ref()).unwrap();
        FileStore::new(dir.path())
            .set(DEFAULT_CACHE_KEY, &blob, settings.retention())
            .unwrap();

        // A new process, two minutes later, with the directory unreachable.
        let offline = Rc::new(Cell::new(true));
        let directory = CountingDirectory {
            ids: vec![1],
            calls: Rc::new(Cell::new(0)),
            offline: Rc::clone(&offline),
        };
        let now = Rc::new(Cell::new(good.built_at + chrono::Duration::minutes(2)));
        let mut cache = UsageCache::new(
            Aggregator::new(Box::new(directory), Box::new(MapOptions(HashMap::new()))),
            Box::new(FileStore::new(dir.path())),
            Box::new(DebugMode::new(false)),
            settings,
        )
        .with_clock(Box::new(ManualClock(Rc::clone(&now))));

        let served = cache.get_snapshot(false).unwrap();
        assert_eq!(served.len(), 3);
        assert_eq!(served.built_at, good.built_at);
        assert!(dir.path().join(format!("{}.json", DEFAULT_CACHE_KEY)).exists());

        // Once the directory is back the stale copy is replaced.
        offline.set(false);
        let rebuilt = cache.get_snapshot(false).unwrap();
        assert_eq!(rebuilt.len(), 1);
    }

    #[test]
    fn test_store_retention_outlives_ttl() {
        let settings = CacheSettings::default();
        assert_eq!(settings.retention(), DEFAULT_TTL * RETENTION_FACTOR);
        assert!(settings.retention() > settings.ttl);
    }

    #[test]
    fn test_undecodable_blob_is_a_miss() {
        let mut h = harness(false);
        h.store.set(DEFAULT_CACHE_KEY, "garbage", DEFAULT_TTL).unwrap();

        let snapshot = h.cache.get_snapshot(false).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(h.calls.get(), 1);
    }

    #[test]
    fn test_parse_bool_flag() {
        assert!(parse_bool_flag("1"));
        assert!(parse_bool_flag(" TRUE "));
        assert!(parse_bool_flag("on"));
        assert!(!parse_bool_flag("0"));
        assert!(!parse_bool_flag("false"));
        assert!(!parse_bool_flag(""));
    }
}
