//! Caching strategies, one per routing class.
//!
//! | Class         | Strategy                   | On network failure                          |
//! |---------------|----------------------------|---------------------------------------------|
//! | `Bypass`      | passthrough                | error propagates                            |
//! | `Navigation`  | network-first with preload | exact entry, then root document, then 503   |
//! | `StaticAsset` | cache-first                | empty 504                                   |
//! | `Default`     | network-first              | exact entry, then 204 for images, else 503  |
//!
//! Each strategy issues at most one network attempt and at most one cache
//! read/write pair. Writes go to the current generation in the background;
//! the response never waits for them and a failed write is logged and
//! dropped.

use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;

use crate::Error;
use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::fetch::{Fetcher, Preload};
use crate::http::{Destination, Request, Response};
use crate::route::RoutingClass;

/// Runs the strategy associated with a routing class.
#[derive(Clone)]
pub struct StrategyExecutor {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    config: Arc<WorkerConfig>,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl StrategyExecutor {
    pub fn new(fetcher: Arc<dyn Fetcher>, storage: Arc<dyn CacheStorage>, config: Arc<WorkerConfig>) -> Self {
        Self { fetcher, storage, config, pending: Arc::new(Mutex::new(JoinSet::new())) }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Produce the response for `request` under the strategy of `class`.
    ///
    /// Only `Bypass` can return an error; every other class always resolves
    /// to a response.
    pub async fn execute(
        &self, class: RoutingClass, request: &Request, preload: Option<Preload>,
    ) -> Result<Response, Error> {
        match class {
            RoutingClass::Bypass => self.passthrough(request).await,
            RoutingClass::Navigation => Ok(self.network_first_with_preload(request, preload).await),
            RoutingClass::StaticAsset => Ok(self.cache_first(request).await),
            RoutingClass::Default => Ok(self.network_first(request).await),
        }
    }

    /// Fetch and return verbatim. No cache access.
    pub async fn passthrough(&self, request: &Request) -> Result<Response, Error> {
        self.fetcher.fetch(request).await
    }

    pub async fn network_first_with_preload(&self, request: &Request, preload: Option<Preload>) -> Response {
        match self.fetch_navigation(request, preload).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(%request, error = %e, "navigation failed, falling back to cache");
                if let Some(cached) = self.lookup(request).await {
                    return cached;
                }
                match self.config.resolve(&self.config.root_document) {
                    Ok(root) => {
                        if let Some(cached) = self.lookup(&Request::get(root)).await {
                            return cached;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "root document does not resolve"),
                }
                tracing::warn!(%request, "no cached document for offline navigation");
                Response::offline()
            }
        }
    }

    pub async fn cache_first(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(request).await {
            tracing::debug!(%request, "cache hit");
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_in_background(request, &response);
                response
            }
            Err(e) => {
                tracing::debug!(%request, error = %e, "static asset unavailable");
                Response::empty(504)
            }
        }
    }

    pub async fn network_first(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if request.is_same_origin(&self.config.origin.origin()) {
                    self.store_in_background(request, &response);
                }
                response
            }
            Err(e) => {
                tracing::debug!(%request, error = %e, "network failed, falling back to cache");
                if let Some(cached) = self.lookup(request).await {
                    return cached;
                }
                if request.destination == Destination::Image {
                    Response::empty(204)
                } else {
                    Response::offline()
                }
            }
        }
    }

    async fn fetch_navigation(&self, request: &Request, preload: Option<Preload>) -> Result<Response, Error> {
        if let Some(preload) = preload
            && let Some(response) = preload.await?
        {
            tracing::debug!(%request, "serving navigation preload response");
            return Ok(response);
        }

        let response = self.fetcher.fetch(request).await?;
        self.store_in_background(request, &response);
        Ok(response)
    }

    /// Wait for every background write issued so far.
    pub async fn settle(&self) {
        let mut pending = match self.pending.lock() {
            Ok(mut set) => std::mem::take(&mut *set),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "cache write task failed");
            }
        }
    }

    /// Read from the current generation. Storage errors count as misses.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.storage.get(self.config.generation.as_str(), request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(%request, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Write a clone of `response` to the current generation without
    /// delaying the caller.
    fn store_in_background(&self, request: &Request, response: &Response) {
        if !request.is_safe_read() {
            tracing::debug!(%request, "not caching non-GET request");
            return;
        }
        if !response.is_storable() {
            tracing::debug!(%request, status = response.status, "response refused by cache store");
            return;
        }

        let storage = Arc::clone(&self.storage);
        let generation = self.config.generation.clone();
        let request = request.clone();
        let response = response.clone();

        let task = async move {
            if let Err(e) = storage.put(generation.as_str(), &request, &response).await {
                tracing::warn!(%request, error = %e, "cache write failed");
            }
        };

        match self.pending.lock() {
            Ok(mut set) => {
                while set.try_join_next().is_some() {}
                set.spawn(task);
            }
            Err(poisoned) => {
                poisoned.into_inner().spawn(task);
            }
        }
    }
}
