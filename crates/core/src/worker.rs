//! The worker: lifecycle state plus per-request dispatch.
//!
//! [`ServiceWorker::handle_fetch`] makes the intercept decision as a plain
//! return value. Requests pass through untouched until the worker is
//! activated and controls its clients, and bypass-class requests always
//! pass through.

use std::sync::{Arc, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::Error;
use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::fetch::{Fetcher, Preload};
use crate::http::{Request, Response};
use crate::lifecycle::{ActivateReport, InstallReport, LifecycleManager};
use crate::registration::Registration;
use crate::route::RoutingClass;
use crate::strategy::StrategyExecutor;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install or activate failed; the worker never handles requests.
    Redundant,
}

/// An intercepted request plus its optional navigation preload.
pub struct FetchEvent {
    pub request: Request,
    pub preload: Option<Preload>,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self { request, preload: None }
    }

    pub fn with_preload(mut self, preload: Preload) -> Self {
        self.preload = Some(preload);
        self
    }
}

impl From<Request> for FetchEvent {
    fn from(request: Request) -> Self {
        Self::new(request)
    }
}

/// Result of offering a request to the worker.
pub enum FetchOutcome<'a> {
    /// Not intercepted: the caller issues the request unmodified.
    PassThrough(Request),
    /// Intercepted: the future always resolves to a response.
    Intercepted { class: RoutingClass, response: BoxFuture<'a, Response> },
}

impl std::fmt::Debug for FetchOutcome<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PassThrough(request) => f.debug_tuple("PassThrough").field(request).finish(),
            Self::Intercepted { class, .. } => f.debug_struct("Intercepted").field("class", class).finish_non_exhaustive(),
        }
    }
}

pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    executor: StrategyExecutor,
    lifecycle: LifecycleManager,
    registration: Arc<dyn Registration>,
    state: RwLock<WorkerState>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig, fetcher: Arc<dyn Fetcher>, storage: Arc<dyn CacheStorage>,
        registration: Arc<dyn Registration>,
    ) -> Self {
        let config = Arc::new(config);
        let executor = StrategyExecutor::new(Arc::clone(&fetcher), Arc::clone(&storage), Arc::clone(&config));
        let lifecycle = LifecycleManager::new(fetcher, storage, Arc::clone(&registration), Arc::clone(&config));
        Self { config, executor, lifecycle, registration, state: RwLock::new(WorkerState::Parsed) }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        match self.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: WorkerState) {
        match self.state.write() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *state != from {
            return Err(Error::InvalidInput(format!("worker is {:?}, expected {from:?}", *state)));
        }
        *state = to;
        Ok(())
    }

    /// Run the install phase. A failure makes the worker redundant.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        match self.lifecycle.install().await {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "install failed");
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Run the activate phase. Requires a completed install.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;
        match self.lifecycle.activate().await {
            Ok(report) => {
                self.set_state(WorkerState::Activated);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "activate failed");
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Install then activate.
    pub async fn start(&self) -> Result<(InstallReport, ActivateReport), Error> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }

    /// Whether routed requests go through the strategies yet.
    pub fn is_controlling(&self) -> bool {
        self.state() == WorkerState::Activated && self.registration.controls_clients()
    }

    pub fn navigation_preload_enabled(&self) -> bool {
        self.registration.navigation_preload_enabled()
    }

    pub fn classify(&self, request: &Request) -> RoutingClass {
        self.config.rules.classify(request, &self.config.origin.origin())
    }

    /// Whether [`handle_fetch`](Self::handle_fetch) would hand `request`
    /// back untouched. Looks only at the request line and headers.
    pub fn passes_through(&self, request: &Request) -> bool {
        !self.is_controlling() || self.classify(request) == RoutingClass::Bypass
    }

    /// Decide whether to intercept, and if so, with which strategy.
    pub fn handle_fetch(&self, event: FetchEvent) -> FetchOutcome<'_> {
        if !self.is_controlling() {
            return FetchOutcome::PassThrough(event.request);
        }

        let class = self.classify(&event.request);
        tracing::debug!(request = %event.request, %class, "routing request");

        if class == RoutingClass::Bypass {
            return FetchOutcome::PassThrough(event.request);
        }

        let FetchEvent { request, preload } = event;
        let response = async move {
            match self.executor.execute(class, &request, preload).await {
                Ok(response) => response,
                // Only Bypass can fail and it never reaches the executor here.
                Err(e) => {
                    tracing::error!(%request, error = %e, "intercepted strategy failed");
                    Response::offline()
                }
            }
        }
        .boxed();

        FetchOutcome::Intercepted { class, response }
    }

    /// Resolve a request to a response, issuing the plain network fetch for
    /// pass-through requests. Only pass-through requests can fail.
    pub async fn respond(&self, event: FetchEvent) -> Result<Response, Error> {
        match self.handle_fetch(event) {
            FetchOutcome::PassThrough(request) => self.executor.passthrough(&request).await,
            FetchOutcome::Intercepted { response, .. } => Ok(response.await),
        }
    }

    /// Wait for outstanding background cache writes.
    pub async fn settle(&self) {
        self.executor.settle().await;
    }
}
