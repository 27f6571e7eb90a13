//! Versioned, named cache stores.
//!
//! A cache store maps request identity (method + URL) to a stored response.
//! Stores are addressed by name; the worker only ever writes to the store
//! named by its current generation.
//!
//! Two backends implement [`CacheStorage`]:
//!
//! - [`CacheDb`]: SQLite via tokio-rusqlite, WAL mode, schema migrations
//! - [`MemoryStorage`]: process-local maps, used for tests and ephemeral runs

pub mod connection;
pub mod entries;
pub mod hash;
pub mod memory;
pub mod migrations;

use std::sync::Arc;

use async_trait::async_trait;

pub use crate::Error;
use crate::http::{Request, Response};

pub use connection::CacheDb;
pub use memory::MemoryStorage;

/// Storage contract consumed by the strategies and the lifecycle.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named store if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), Error>;

    /// Look up the entry for `request`. A miss is `Ok(None)`.
    async fn get(&self, name: &str, request: &Request) -> Result<Option<Response>, Error>;

    /// Store `response` under the identity of `request`, replacing any
    /// previous entry with that identity. Creates the store implicitly.
    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<(), Error>;

    /// Delete a whole store. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Names of all stores, oldest first.
    async fn keys(&self) -> Result<Vec<String>, Error>;
}

/// An opened cache store.
#[derive(Clone)]
pub struct Cache {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl Cache {
    /// Open (and implicitly create) the store called `name`.
    pub async fn open(storage: Arc<dyn CacheStorage>, name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        storage.open(&name).await?;
        Ok(Self { storage, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, request: &Request) -> Result<Option<Response>, Error> {
        self.storage.get(&self.name, request).await
    }

    pub async fn put(&self, request: &Request, response: &Response) -> Result<(), Error> {
        self.storage.put(&self.name, request, response).await
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_handle_roundtrip() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let cache = Cache::open(storage.clone(), "app-v1").await.unwrap();
        let req = Request::parse_get("https://example.com/a.css").unwrap();

        assert!(cache.get(&req).await.unwrap().is_none());
        cache.put(&req, &Response::new(200, "body{}")).await.unwrap();

        let hit = cache.get(&req).await.unwrap().unwrap();
        assert_eq!(hit.body.as_ref(), b"body{}");
        assert_eq!(storage.keys().await.unwrap(), vec!["app-v1".to_string()]);
    }
}
