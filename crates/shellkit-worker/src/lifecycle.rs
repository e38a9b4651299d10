//! Worker lifecycle: state machine, install-time precaching, and
//! activation-time eviction of stale cache generations.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use shellkit_net::{Fetcher, Request, Response};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::config::{InstallPolicy, WorkerConfig};
use crate::{Result, ServiceWorkerError};

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Constructed, nothing run yet.
    #[default]
    New,
    /// Installing (install event).
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Active,
    /// Redundant (install failed or replaced).
    Redundant,
}

impl WorkerState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (New, Installing)
                | (Installed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Active)
        ) || (next == Redundant && self != Redundant)
    }
}

/// Lifecycle bookkeeping for one worker.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: WorkerState::New,
            skip_waiting: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Active
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&mut self, next: WorkerState) -> Result<WorkerState> {
        if !self.state.can_transition_to(next) {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot move from {:?} to {:?}",
                self.state, next
            )));
        }
        let previous = self.state;
        self.state = next;
        Ok(previous)
    }

    /// Become the activation candidate without waiting for old clients to close.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn is_waiting_skipped(&self) -> bool {
        self.skip_waiting
    }
}

// ==================== Install ====================

/// Outcome of precaching the static manifest.
#[derive(Debug, Clone, Default)]
pub struct PrecacheReport {
    /// URLs written to the static partition.
    pub cached: Vec<Url>,
    /// Manifest entries that could not be fetched, with the reason.
    pub failed: Vec<(String, String)>,
}

impl PrecacheReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch every manifest entry and write the results into the static partition.
///
/// Non-2xx responses count as failures. Under [`InstallPolicy::Strict`] any
/// failure aborts the install before anything is written.
pub async fn precache(
    store: &CacheStore,
    fetcher: &dyn Fetcher,
    config: &WorkerConfig,
) -> Result<PrecacheReport> {
    let fetches = config.precache_manifest.iter().map(|path| async move {
        let request = match config.resolve(path) {
            Ok(url) => Request::get(url),
            Err(e) => return Err(e.to_string()),
        };
        match fetcher.fetch(&request).await {
            Ok(response) if response.ok() => Ok((request, response)),
            Ok(response) => Err(format!("HTTP {}", response.status)),
            Err(e) => Err(e.to_string()),
        }
    });

    let mut fetched: Vec<(Request, Response)> = Vec::new();
    let mut report = PrecacheReport::default();
    for (path, result) in config.precache_manifest.iter().zip(join_all(fetches).await) {
        match result {
            Ok(pair) => fetched.push(pair),
            Err(reason) => {
                warn!(path = %path, reason = %reason, "Precache fetch failed");
                report.failed.push((path.clone(), reason));
            }
        }
    }

    if !report.is_complete() && config.install_policy == InstallPolicy::Strict {
        let failed: Vec<&str> = report.failed.iter().map(|(p, _)| p.as_str()).collect();
        return Err(ServiceWorkerError::InstallFailed(format!(
            "could not precache {}",
            failed.join(", ")
        )));
    }

    store.put_static(&fetched).await?;
    report.cached = fetched.into_iter().map(|(request, _)| request.url).collect();

    info!(
        cache = store.static_name(),
        cached = report.cached.len(),
        failed = report.failed.len(),
        "Precache complete"
    );
    Ok(report)
}

// ==================== Activate ====================

/// Outcome of evicting stale cache generations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub deleted: Vec<String>,
    /// Names that could not be deleted; eviction carried on regardless.
    pub failed: Vec<String>,
}

/// Delete every cache not named in `keep`, concurrently, then make sure the
/// current partitions exist.
pub async fn evict_stale(store: &CacheStore) -> EvictionReport {
    let keep = [store.static_name(), store.dynamic_name()];
    let stale: Vec<String> = store
        .cache_names()
        .await
        .into_iter()
        .filter(|name| !keep.contains(&name.as_str()))
        .collect();

    let deletions = stale.iter().map(|name| async move {
        let deleted = store.delete_cache(name).await;
        (name.clone(), deleted)
    });

    let mut report = EvictionReport::default();
    for (name, deleted) in join_all(deletions).await {
        if deleted {
            debug!(cache = %name, "Deleted stale cache");
            report.deleted.push(name);
        } else {
            warn!(cache = %name, "Stale cache could not be deleted");
            report.failed.push(name);
        }
    }

    store.ensure_partitions().await;
    report
}
