//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use url::Url;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_token(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(invalid(field, "must not contain whitespace"));
    }
    Ok(())
}

/// Origin-relative paths: a single leading '/', never scheme-relative.
fn check_path(field: &str, path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') || path.starts_with("//") {
        return Err(invalid(field, format!("'{path}' must be a path starting with a single '/'")));
    }
    Ok(())
}

fn check_paths(field: &str, paths: &[String]) -> Result<(), ConfigError> {
    paths.iter().try_for_each(|p| check_path(field, p))
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for the first rule that fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_origin()?;

        check_token("cache_prefix", &self.cache_prefix)?;
        check_token("cache_version", &self.cache_version)?;

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if let Some(bad) = self.bypass_extensions.iter().find(|e| !e.starts_with('.') || e.len() < 2) {
            return Err(invalid("bypass_extensions", format!("'{bad}' must look like '.ext'")));
        }

        check_paths("precache", &self.precache)?;
        check_paths("static_prefixes", &self.static_prefixes)?;
        check_paths("static_paths", &self.static_paths)?;
        check_path("root_document", &self.root_document)?;

        let mut seen = HashSet::new();
        if let Some(dup) = self.precache.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(invalid("precache", format!("duplicate entry '{dup}'")));
        }

        if !self.precache.contains(&self.root_document) {
            tracing::warn!(
                root_document = %self.root_document,
                "root_document is not precached; offline navigations may have no fallback"
            );
        }

        Ok(())
    }

    /// Parse `origin`, which must be an absolute http(s) URL without a path.
    pub(crate) fn parsed_origin(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin).map_err(|e| invalid("origin", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("origin", format!("unsupported scheme: {}", url.scheme())));
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("origin", "must not contain a path, query or fragment"));
        }
        Ok(url)
    }
}
