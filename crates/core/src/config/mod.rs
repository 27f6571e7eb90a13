//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (LANTERN_*)
//! 2. TOML config file (if LANTERN_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded [`AppConfig`] is turned into a [`WorkerConfig`], the validated
//! value handed to the worker at construction.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::generation::CacheGeneration;
use crate::route::{DEFAULT_BYPASS_EXTENSIONS, DEFAULT_STATIC_PATHS, DEFAULT_STATIC_PREFIXES, RouteRules};

mod validation;

pub use validation::ConfigError;

/// Paths fetched and stored during install.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/manifest.webmanifest",
    "/sw.js",
    "/assets/icons/icon-192.png",
    "/assets/icons/icon-512.png",
];

/// What install does when a precache entry cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecachePolicy {
    /// Any failure fails the whole install and nothing is written.
    #[default]
    Atomic,
    /// Store what succeeded, log a warning per failure.
    BestEffort,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LANTERN_*)
/// 2. TOML config file (if LANTERN_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the worker fronts; same-origin checks compare against it.
    ///
    /// Set via LANTERN_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Address the proxy listens on.
    ///
    /// Set via LANTERN_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path to SQLite cache database.
    ///
    /// Set via LANTERN_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Cache store name prefix.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version token embedded in the cache store name. Changing it makes the
    /// next activation prune every older generation.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum buffered response body. Bypass traffic is streamed and exempt.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Same-origin paths stored during install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    #[serde(default)]
    pub precache_policy: PrecachePolicy,

    /// Extensions that are never cached (checked case-insensitively).
    #[serde(default = "default_bypass_extensions")]
    pub bypass_extensions: Vec<String>,

    /// Same-origin path prefixes served cache-first.
    #[serde(default = "default_static_prefixes")]
    pub static_prefixes: Vec<String>,

    /// Same-origin exact paths served cache-first.
    #[serde(default = "default_static_paths")]
    pub static_paths: Vec<String>,

    /// Document served to offline navigations with no cached entry.
    #[serde(default = "default_root_document")]
    pub root_document: String,

    /// Enable navigation preload on activation.
    #[serde(default = "default_true")]
    pub navigation_preload: bool,
}

fn default_origin() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./lantern-cache.sqlite")
}

fn default_cache_prefix() -> String {
    "smart-anah".into()
}

fn default_cache_version() -> String {
    "2".into()
}

fn default_user_agent() -> String {
    "lantern/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_redirects() -> usize {
    5
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_precache() -> Vec<String> {
    to_strings(DEFAULT_PRECACHE)
}

fn default_bypass_extensions() -> Vec<String> {
    to_strings(DEFAULT_BYPASS_EXTENSIONS)
}

fn default_static_prefixes() -> Vec<String> {
    to_strings(DEFAULT_STATIC_PREFIXES)
}

fn default_static_paths() -> Vec<String> {
    to_strings(DEFAULT_STATIC_PATHS)
}

fn default_root_document() -> String {
    "/".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_redirects: default_max_redirects(),
            precache: default_precache(),
            precache_policy: PrecachePolicy::default(),
            bypass_extensions: default_bypass_extensions(),
            static_prefixes: default_static_prefixes(),
            static_paths: default_static_paths(),
            root_document: default_root_document(),
            navigation_preload: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn generation(&self) -> CacheGeneration {
        CacheGeneration::new(&self.cache_prefix, &self.cache_version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be read or
    /// parsed, or if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The layered provider stack used by [`AppConfig::load`].
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("LANTERN_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("LANTERN_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build the validated runtime configuration for the worker.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if validation fails.
    pub fn worker_config(&self) -> Result<WorkerConfig, ConfigError> {
        self.validate()?;
        let origin = self.parsed_origin()?;
        Ok(WorkerConfig {
            origin,
            generation: self.generation(),
            precache: self.precache.clone(),
            precache_policy: self.precache_policy,
            rules: RouteRules::new(&self.bypass_extensions, self.static_prefixes.clone(), self.static_paths.clone()),
            root_document: self.root_document.clone(),
            navigation_preload: self.navigation_preload,
        })
    }
}

/// Runtime configuration passed explicitly to the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub origin: Url,
    pub generation: CacheGeneration,
    pub precache: Vec<String>,
    pub precache_policy: PrecachePolicy,
    pub rules: RouteRules,
    pub root_document: String,
    pub navigation_preload: bool,
}

impl WorkerConfig {
    /// Defaults for everything except the origin.
    pub fn new(origin: Url) -> Self {
        let defaults = AppConfig::default();
        Self {
            origin,
            generation: defaults.generation(),
            precache: defaults.precache,
            precache_policy: defaults.precache_policy,
            rules: RouteRules::default(),
            root_document: defaults.root_document,
            navigation_preload: defaults.navigation_preload,
        }
    }

    /// Resolve a same-origin path against the origin.
    ///
    /// # Errors
    ///
    /// `InvalidUrl` when the path does not parse or escapes the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, crate::Error> {
        let url = self
            .origin
            .join(path)
            .map_err(|e| crate::Error::InvalidUrl(format!("{path}: {e}")))?;
        if url.origin() != self.origin.origin() {
            return Err(crate::Error::InvalidUrl(format!("{path}: not on {}", self.origin)));
        }
        Ok(url)
    }
}
