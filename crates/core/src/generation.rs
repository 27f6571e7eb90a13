//! Cache generation naming.

use std::fmt;

use crate::Error;
use crate::cache::CacheStorage;

/// Name of the cache store owned by the running version.
///
/// The name embeds the version token, so bumping the version yields a new
/// store and leaves the old one to be pruned on activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheGeneration(String);

impl CacheGeneration {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self(format!("{prefix}-v{version}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a store name belongs to some other generation.
    pub fn is_stale(&self, name: &str) -> bool {
        name != self.0
    }

    /// Delete every store in `storage` other than this generation, returning
    /// the names removed in listing order.
    pub async fn prune(&self, storage: &dyn CacheStorage) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in storage.keys().await? {
            if self.is_stale(&name) && storage.delete(&name).await? {
                tracing::info!(generation = %name, "deleted stale cache generation");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }
}

impl fmt::Display for CacheGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
