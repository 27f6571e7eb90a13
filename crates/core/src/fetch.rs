//! Network fetch contract.
//!
//! Timeout and retry behavior belong to the implementation; the strategies
//! issue at most one `fetch` per request.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::Error;
use crate::http::{Request, Response};

/// Network fetch primitive.
///
/// Any HTTP status is a successful fetch. Errors are reserved for requests
/// that produced no response at all.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Early network response for a navigation, started before routing.
///
/// Resolves to `None` when the platform had nothing preloaded.
pub type Preload = BoxFuture<'static, Result<Option<Response>, Error>>;
