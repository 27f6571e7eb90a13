//! Install and activate phases.
//!
//! Install fills the current generation with the precache manifest. Activate
//! enables navigation preload, deletes every other generation and claims the
//! open clients. Each runs once per worker.

use std::sync::Arc;

use futures::future::join_all;

use crate::Error;
use crate::cache::{Cache, CacheStorage};
use crate::config::{PrecachePolicy, WorkerConfig};
use crate::fetch::Fetcher;
use crate::http::{Request, Response};
use crate::registration::Registration;

/// Outcome of the install phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Manifest paths now present in the current generation.
    pub stored: Vec<String>,
    /// `(path, reason)` for entries skipped under the best-effort policy.
    pub failed: Vec<(String, String)>,
}

/// Outcome of the activate phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Stale generations that were deleted.
    pub deleted: Vec<String>,
    pub navigation_preload: bool,
}

#[derive(Clone)]
pub struct LifecycleManager {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    registration: Arc<dyn Registration>,
    config: Arc<WorkerConfig>,
}

impl LifecycleManager {
    pub fn new(
        fetcher: Arc<dyn Fetcher>, storage: Arc<dyn CacheStorage>, registration: Arc<dyn Registration>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self { fetcher, storage, registration, config }
    }

    /// Fetch and store every precache path in the current generation.
    ///
    /// Under [`PrecachePolicy::Atomic`] writing starts only after every
    /// fetch succeeded with a 2xx status. A storage failure during the writes
    /// aborts the install and may leave the entries stored before it; the
    /// worker is not activated in either case.
    ///
    /// # Errors
    ///
    /// `PrecacheFailed` for the first failing entry (atomic policy), or a
    /// storage error.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let generation = self.config.generation.as_str();
        tracing::info!(generation, entries = self.config.precache.len(), "installing");

        let cache = Cache::open(Arc::clone(&self.storage), generation).await?;
        let fetched = join_all(self.config.precache.iter().map(|path| self.fetch_entry(path))).await;

        let mut report = InstallReport::default();
        match self.config.precache_policy {
            PrecachePolicy::Atomic => {
                let entries = fetched.into_iter().collect::<Result<Vec<_>, _>>()?;
                for (path, request, response) in entries {
                    cache.put(&request, &response).await?;
                    report.stored.push(path);
                }
            }
            PrecachePolicy::BestEffort => {
                for entry in fetched {
                    let outcome = match entry {
                        Ok((path, request, response)) => match cache.put(&request, &response).await {
                            Ok(()) => Ok(path),
                            Err(e) => Err((path, e.to_string())),
                        },
                        Err(Error::PrecacheFailed { path, reason }) => Err((path, reason)),
                        Err(e) => return Err(e),
                    };
                    match outcome {
                        Ok(path) => report.stored.push(path),
                        Err((path, reason)) => {
                            tracing::warn!(%path, %reason, "precache entry skipped");
                            report.failed.push((path, reason));
                        }
                    }
                }
            }
        }

        self.registration.skip_waiting();
        tracing::info!(generation, stored = report.stored.len(), failed = report.failed.len(), "installed");
        Ok(report)
    }

    /// Prune stale generations and take control of clients.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let mut report = ActivateReport::default();

        if self.config.navigation_preload && self.registration.supports_navigation_preload() {
            self.registration.enable_navigation_preload();
            report.navigation_preload = self.registration.navigation_preload_enabled();
        }

        report.deleted = self.config.generation.prune(self.storage.as_ref()).await?;

        self.registration.claim_clients();
        tracing::info!(
            generation = %self.config.generation,
            pruned = report.deleted.len(),
            navigation_preload = report.navigation_preload,
            "activated"
        );
        Ok(report)
    }

    async fn fetch_entry(&self, path: &str) -> Result<(String, Request, Response), Error> {
        let failed = |reason: String| Error::PrecacheFailed { path: path.to_string(), reason };

        let url = self.config.resolve(path).map_err(|e| failed(e.to_string()))?;
        let request = Request::get(url);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.is_ok() {
            return Err(failed(format!("status {}", response.status)));
        }

        Ok((path.to_string(), request, response))
    }
}
