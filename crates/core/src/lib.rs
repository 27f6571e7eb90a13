//! Core types and request-interception engine for lantern.
//!
//! This crate provides:
//! - Request classification into routing classes
//! - Per-class caching strategies (passthrough, network-first, cache-first)
//! - The install/activate lifecycle over versioned cache generations
//! - Cache storage with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod generation;
pub mod http;
pub mod lifecycle;
pub mod registration;
pub mod route;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cache::{Cache, CacheDb, CacheStorage, MemoryStorage};
pub use config::{AppConfig, ConfigError, PrecachePolicy, WorkerConfig};
pub use error::Error;
pub use fetch::{Fetcher, Preload};
pub use generation::CacheGeneration;
pub use http::{Destination, Request, RequestMode, Response};
pub use lifecycle::{ActivateReport, InstallReport, LifecycleManager};
pub use registration::{LocalRegistration, Registration};
pub use route::{RouteRules, RoutingClass};
pub use strategy::StrategyExecutor;
pub use worker::{FetchEvent, FetchOutcome, ServiceWorker, WorkerState};
