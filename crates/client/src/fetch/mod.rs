//! HTTP fetch pipeline behind the worker's network primitive.
//!
//! ### URL Canonicalization
//! - Scheme must be `http` or `https`
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable), enforced while reading
//! - Timeout: 20s for buffered fetches; streamed pass-through responses only
//!   bound the connect phase
//!
//! Any HTTP status is returned as a response. Errors are reserved for
//! requests that produced no response at all.

pub mod url;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};

pub use url::{UrlError, canonicalize, resolve};

use lantern_core::{AppConfig, Error, Fetcher, Request, Response};

/// Connection-scoped headers that must not be forwarded by a proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Whether a header is connection-scoped and must not be forwarded.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Request headers the HTTP client sets itself.
fn is_client_managed(name: &str) -> bool {
    ["host", "content-length", "accept-encoding"]
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Response headers invalidated by transparent decompression.
fn is_body_framing(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-encoding") || name.eq_ignore_ascii_case("content-length")
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "lantern/0.1")
    pub user_agent: String,

    /// Maximum buffered response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "lantern/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// Body bytes still on the wire, in either direction.
pub type ByteStream = BoxStream<'static, Result<Bytes, Error>>;

/// A response whose body is still on the wire.
pub struct StreamedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// reqwest-backed implementation of [`Fetcher`].
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Issue a request and hand back the body as a stream.
    ///
    /// Used for pass-through traffic: nothing is buffered and the byte limit
    /// does not apply. When `body` is given it is sent in place of
    /// `request.body`, without being collected first.
    pub async fn forward(&self, request: &Request, body: Option<ByteStream>) -> Result<StreamedResponse, Error> {
        let mut builder = self.build(request)?;
        if let Some(body) = body {
            if let Some(len) = request.header("content-length") {
                builder = builder.header(reqwest::header::CONTENT_LENGTH, len);
            }
            builder = builder.body(reqwest::Body::wrap_stream(body));
        }
        let response = builder.send().await.map_err(send_error)?;

        let status = response.status().as_u16();
        let headers = response_headers(response.headers());
        tracing::debug!(%request, status, "forwarding streamed response");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Network(format!("failed to read response: {e}"))))
            .boxed();

        Ok(StreamedResponse { status, headers, body })
    }

    fn build(&self, request: &Request) -> Result<reqwest::RequestBuilder, Error> {
        let url = url::normalize(request.url.clone()).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            if is_hop_by_hop(name) || is_client_managed(name) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidInput(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidInput(format!("invalid value for header {name}: {e}")))?;
            headers.append(name, value);
        }

        let mut builder = self.http.request(method, url).headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        Ok(builder)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Fetch and buffer a response, enforcing the byte limit while reading.
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let mut response = self
            .build(request)?
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status().as_u16();
        let max_bytes = self.config.max_bytes;
        if let Some(len) = response.content_length()
            && len as usize > max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{len} bytes exceeds {max_bytes}")));
        }

        let final_url = response.url().clone();
        let headers = response_headers(response.headers());

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(send_error)? {
            if body.len() + chunk.len() > max_bytes {
                return Err(Error::FetchTooLarge(format!(
                    "more than {max_bytes} bytes from {final_url}"
                )));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(
            "fetched {} -> {} {} in {}ms ({} bytes)",
            request,
            final_url,
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(Response { status, headers, body: body.freeze(), url: Some(final_url) })
    }
}

fn send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() { Error::FetchTimeout(e.to_string()) } else { Error::Network(e.to_string()) }
}

fn response_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()) && !is_body_framing(name.as_str()))
        .map(|(name, value)| {
            (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
        })
        .collect()
}
