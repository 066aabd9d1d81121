//! Host event handling.
//!
//! Plugin activation and deactivation fire before the option store has
//! committed the change, so they only schedule an invalidation. Scheduled
//! work runs when the current unit of work ends (`HostEvent::Shutdown`).

use crate::cache::UsageCache;
use crate::error::{UsageError, UsageResult};
use tracing::{debug, info, warn};

/// Events raised by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A plugin was activated on a site or network-wide.
    PluginActivated(String),
    /// A plugin was deactivated on a site or network-wide.
    PluginDeactivated(String),
    /// The network plugins admin page is loading.
    PluginsPageLoad,
    /// The current request or transaction has completed.
    Shutdown,
}

/// Work scheduled to run after the current unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    Invalidate { reason: String },
}

/// Subscribes the usage cache to host events.
#[derive(Debug, Default)]
pub struct UsageHooks {
    pending: Vec<Deferred>,
    notices: Vec<String>,
}

impl UsageHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deferred tasks waiting for shutdown.
    #[allow(dead_code)] // Inspection helper
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Admin notices collected so far.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Handle one host event.
    pub fn dispatch(&mut self, event: HostEvent, cache: &mut UsageCache) -> UsageResult<()> {
        match event {
            HostEvent::PluginActivated(plugin) => {
                debug!("Plugin activated: {}", plugin);
                self.schedule_invalidation(format!("activated {}", plugin));
            }
            HostEvent::PluginDeactivated(plugin) => {
                debug!("Plugin deactivated: {}", plugin);
                self.schedule_invalidation(format!("deactivated {}", plugin));
            }
            HostEvent::PluginsPageLoad => {
                if let Some(notice) = cache.debug_notice()? {
                    self.notices.push(notice.to_string());
                }
            }
            HostEvent::Shutdown => self.flush(cache)?,
        }
        Ok(())
    }

    /// Run `work` as one unit of work and then fire `Shutdown`, even when
    /// `work` fails, so scheduled invalidations are never lost.
    pub fn within_unit<T, E, F>(&mut self, cache: &mut UsageCache, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self, &mut UsageCache) -> Result<T, E>,
        E: From<UsageError>,
    {
        let outcome = work(self, cache);
        let flushed = self.dispatch(HostEvent::Shutdown, cache);

        match (outcome, flushed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(flush_error)) => {
                warn!("Deferred invalidation failed: {}", flush_error);
                Err(e)
            }
        }
    }

    fn schedule_invalidation(&mut self, reason: String) {
        self.pending.push(Deferred::Invalidate { reason });
    }

    /// Run everything scheduled so far. Several pending invalidations
    /// collapse into one store delete.
    fn flush(&mut self, cache: &mut UsageCache) -> UsageResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let tasks = std::mem::take(&mut self.pending);
        let reasons: Vec<&str> = tasks
            .iter()
            .map(|task| match task {
                Deferred::Invalidate { reason } => reason.as_str(),
            })
            .collect();

        info!("Invalidating usage snapshot after: {}", reasons.join(", "));
        cache.invalidate()
    }
}
