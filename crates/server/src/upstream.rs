//! The proxy's view of the network: buffered fetches for the worker and
//! streamed fetches for pass-through traffic.

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use futures::stream;

use lantern_client::{ByteStream, HttpFetcher, StreamedResponse};
use lantern_core::{Error, Fetcher, Request};

#[async_trait]
pub trait Upstream: Fetcher {
    /// Issue a pass-through request, sending `body` in place of
    /// `request.body` when given.
    ///
    /// The default collects the body, buffers through [`Fetcher::fetch`] and
    /// replays the response as a single chunk.
    async fn forward(&self, request: &Request, body: Option<ByteStream>) -> Result<StreamedResponse, Error> {
        let response = match body {
            Some(mut body) => {
                let mut collected = BytesMut::new();
                while let Some(chunk) = body.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                self.fetch(&request.clone().with_body(collected.freeze())).await?
            }
            None => self.fetch(request).await?,
        };
        let body = response.body;
        Ok(StreamedResponse {
            status: response.status,
            headers: response.headers,
            body: stream::once(async move { Ok(body) }).boxed(),
        })
    }
}

#[async_trait]
impl Upstream for HttpFetcher {
    async fn forward(&self, request: &Request, body: Option<ByteStream>) -> Result<StreamedResponse, Error> {
        HttpFetcher::forward(self, request, body).await
    }
}
