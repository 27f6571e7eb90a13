//! Test doubles for the fetch and storage contracts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use url::Url;

use crate::Error;
use crate::cache::{CacheStorage, MemoryStorage};
use crate::config::WorkerConfig;
use crate::fetch::Fetcher;
use crate::http::{Request, Response};

pub const ORIGIN: &str = "https://twin.example.com";

pub fn worker_config() -> WorkerConfig {
    WorkerConfig::new(Url::parse(ORIGIN).unwrap())
}

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Scripted network: serves registered URLs, 404 otherwise, or fails every
/// request while offline.
#[derive(Default)]
pub struct StubNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    seen: Mutex<Vec<Request>>,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &Url, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StubNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {request}")));
        }
        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// Storage wrapper that counts every access and can refuse writes.
#[derive(Default)]
pub struct SpyStorage {
    inner: MemoryStorage,
    accesses: AtomicUsize,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
}

impl SpyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    fn touch(&self) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for SpyStorage {
    async fn open(&self, name: &str) -> Result<(), Error> {
        self.touch();
        self.inner.open(name).await
    }

    async fn get(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        self.touch();
        self.inner.get(name, request).await
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<(), Error> {
        self.touch();
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Serialization("disk full".into()));
        }
        self.inner.put(name, request, response).await
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        self.touch();
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.touch();
        self.inner.keys().await
    }
}
