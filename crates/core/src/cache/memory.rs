//! In-process cache storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheStorage;
use super::hash::compute_cache_key;
use crate::Error;
use crate::http::{Request, Response};

#[derive(Default)]
struct Store {
    opened_seq: u64,
    entries: HashMap<String, Response>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    stores: HashMap<String, Store>,
}

impl Inner {
    fn store_mut(&mut self, name: &str) -> &mut Store {
        if !self.stores.contains_key(name) {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.stores
                .insert(name.to_string(), Store { opened_seq: seq, entries: HashMap::new() });
        }
        self.stores.entry(name.to_string()).or_default()
    }
}

/// Cache storage held in memory, lost when the process exits.
///
/// Uses a tokio RwLock so concurrent readers do not serialize.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<(), Error> {
        self.inner.write().await.store_mut(name);
        Ok(())
    }

    async fn get(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        let key = compute_cache_key(&request.method, &request.url);
        let inner = self.inner.read().await;
        Ok(inner.stores.get(name).and_then(|s| s.entries.get(&key)).cloned())
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<(), Error> {
        let key = compute_cache_key(&request.method, &request.url);
        self.inner
            .write()
            .await
            .store_mut(name)
            .entries
            .insert(key, response.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        Ok(self.inner.write().await.stores.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let inner = self.inner.read().await;
        let mut stores: Vec<(&String, u64)> = inner.stores.iter().map(|(k, s)| (k, s.opened_seq)).collect();
        stores.sort_by_key(|(_, seq)| *seq);
        Ok(stores.into_iter().map(|(k, _)| k.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keys_in_open_order() {
        let storage = MemoryStorage::new();
        storage.open("b-v1").await.unwrap();
        storage.open("a-v1").await.unwrap();
        storage.open("b-v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["b-v1".to_string(), "a-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_put_creates_store_and_overwrites() {
        let storage = MemoryStorage::new();
        let req = Request::parse_get("https://example.com/x").unwrap();
        storage.put("app-v1", &req, &Response::new(200, "1")).await.unwrap();
        storage.put("app-v1", &req, &Response::new(200, "2")).await.unwrap();

        let hit = storage.get("app-v1", &req).await.unwrap().unwrap();
        assert_eq!(hit.body.as_ref(), b"2");
        assert_eq!(storage.keys().await.unwrap(), vec!["app-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryStorage::new();
        storage.open("app-v1").await.unwrap();
        assert!(storage.delete("app-v1").await.unwrap());
        assert!(!storage.delete("app-v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }
}
