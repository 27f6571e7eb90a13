//! HTTP front for the worker.
//!
//! Every inbound request is mapped onto the configured origin and offered to
//! the worker. Intercepted requests are answered from the caching strategies;
//! pass-through requests are streamed straight from upstream.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, HttpBody};
use axum::extract::State;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::{FutureExt, StreamExt};

use lantern_client::{ByteStream, StreamedResponse, is_hop_by_hop};
use lantern_core::{
    Destination, Error, FetchEvent, FetchOutcome, Preload, Request, RequestMode, RoutingClass, ServiceWorker,
};

use crate::error::ProxyError;
use crate::upstream::Upstream;

/// Header carried by the early navigation fetch.
pub const PRELOAD_HEADER: &str = "Service-Worker-Navigation-Preload";

#[derive(Clone)]
pub struct ProxyState {
    worker: Arc<ServiceWorker>,
    upstream: Arc<dyn Upstream>,
    max_request_bytes: usize,
}

impl ProxyState {
    pub fn new(worker: Arc<ServiceWorker>, upstream: Arc<dyn Upstream>, max_request_bytes: usize) -> Self {
        Self { worker, upstream, max_request_bytes }
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new().fallback(proxy).with_state(state)
}

async fn proxy(State(state): State<ProxyState>, request: axum::extract::Request) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let request = to_core_request(&state, &parts);

    // Pass-through bodies go upstream as they arrive, with no size limit.
    if state.worker.passes_through(&request) {
        tracing::debug!(%request, "passing through");
        let body = (!body.is_end_stream()).then(|| body_stream(body));
        let streamed = state.upstream.forward(&request, body).await?;
        return Ok(streamed_response(streamed));
    }

    let body = axum::body::to_bytes(body, state.max_request_bytes)
        .await
        .map_err(|e| ProxyError::BadRequest(format!("failed to read request body: {e}")))?;

    let mut event = FetchEvent::new(request.with_body(body));
    if wants_preload(&state.worker, &event.request) {
        let preload = start_preload(Arc::clone(&state.upstream), &event.request);
        event = event.with_preload(preload);
    }

    match state.worker.handle_fetch(event) {
        FetchOutcome::PassThrough(request) => {
            tracing::debug!(%request, "passing through");
            let streamed = state.upstream.forward(&request, None).await?;
            Ok(streamed_response(streamed))
        }
        FetchOutcome::Intercepted { class, response } => {
            let response = response.await;
            tracing::debug!(%class, status = response.status, "answered intercepted request");
            Ok(build_response(response))
        }
    }
}

fn body_stream(body: Body) -> ByteStream {
    body.into_data_stream()
        .map(|chunk| chunk.map_err(|e| Error::Network(format!("failed to read request body: {e}"))))
        .boxed()
}

fn wants_preload(worker: &ServiceWorker, request: &Request) -> bool {
    worker.is_controlling()
        && worker.navigation_preload_enabled()
        && worker.classify(request) == RoutingClass::Navigation
}

/// Start the navigation fetch now so it overlaps with routing.
fn start_preload(upstream: Arc<dyn Upstream>, request: &Request) -> Preload {
    let request = request.clone().with_header(PRELOAD_HEADER, "true");
    let task = tokio::spawn(async move { upstream.fetch(&request).await });
    async move {
        match task.await {
            Ok(result) => result.map(Some),
            Err(e) => Err(Error::Network(format!("navigation preload aborted: {e}"))),
        }
    }
    .boxed()
}

/// Map the request line and headers onto the origin. The body is attached
/// later, once it is known whether the request is intercepted.
fn to_core_request(state: &ProxyState, parts: &Parts) -> Request {
    let mut url = state.worker.config().origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let mode = request_mode(&parts.method, &parts.headers);
    let destination = request_destination(mode, &parts.headers);

    let mut mapped = Request::new(parts.method.as_str(), url)
        .with_mode(mode)
        .with_destination(destination);
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name.as_str()) || *name == header::HOST {
            continue;
        }
        mapped = mapped.with_header(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    mapped
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `Sec-Fetch-Mode` when present, otherwise an HTML `GET` is a navigation.
fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    if let Some(mode) = header_str(headers, "sec-fetch-mode").and_then(|v| v.parse().ok()) {
        return mode;
    }
    let accepts_html = header_str(headers, "accept").is_some_and(|v| v.contains("text/html"));
    if *method == Method::GET && accepts_html { RequestMode::Navigate } else { RequestMode::NoCors }
}

fn request_destination(mode: RequestMode, headers: &HeaderMap) -> Destination {
    if let Some(dest) = header_str(headers, "sec-fetch-dest").and_then(|v| v.parse().ok()) {
        return dest;
    }
    if header_str(headers, "accept").is_some_and(|v| v.starts_with("image/")) {
        Destination::Image
    } else if mode == RequestMode::Navigate {
        Destination::Document
    } else {
        Destination::Empty
    }
}

fn respond_with(status: u16, headers: &[(String, String)], body: Body) -> Response {
    let mut builder = Response::builder().status(status);

    for (name, value) in headers {
        if let Ok(header_value) = HeaderValue::from_str(value) {
            builder = builder.header(name.as_str(), header_value);
        }
    }

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Build an HTTP response from a cached or fetched one.
fn build_response(response: lantern_core::Response) -> Response {
    respond_with(response.status, &response.headers, Body::from(response.body))
}

fn streamed_response(streamed: StreamedResponse) -> Response {
    respond_with(streamed.status, &streamed.headers, Body::from_stream(streamed.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use axum::http::Request as HttpRequest;
    use lantern_core::config::DEFAULT_PRECACHE;
    use lantern_core::{Fetcher, LocalRegistration, MemoryStorage, WorkerConfig};
    use tower::ServiceExt;
    use url::Url;

    const ORIGIN: &str = "https://twin.example.com";

    /// Serves registered paths regardless of query, 404 otherwise.
    #[derive(Default)]
    struct StubUpstream {
        routes: Mutex<HashMap<String, lantern_core::Response>>,
        offline: AtomicBool,
        seen: Mutex<Vec<Request>>,
    }

    impl StubUpstream {
        fn serve(&self, path: &str, response: lantern_core::Response) {
            self.routes.lock().unwrap().insert(path.to_string(), response);
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn seen_for(&self, path: &str) -> Vec<Request> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.path() == path)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl Fetcher for StubUpstream {
        async fn fetch(&self, request: &Request) -> Result<lantern_core::Response, Error> {
            self.seen.lock().unwrap().push(request.clone());
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::Network("offline".into()));
            }
            let routes = self.routes.lock().unwrap();
            Ok(routes
                .get(request.url.path())
                .cloned()
                .unwrap_or_else(|| lantern_core::Response::new(404, "not found")))
        }
    }

    impl Upstream for StubUpstream {}

    async fn started() -> (Arc<StubUpstream>, Arc<ServiceWorker>, Router) {
        let upstream = Arc::new(StubUpstream::default());
        for path in DEFAULT_PRECACHE {
            upstream.serve(path, lantern_core::Response::new(200, format!("content of {path}")));
        }
        let worker = Arc::new(ServiceWorker::new(
            WorkerConfig::new(Url::parse(ORIGIN).unwrap()),
            upstream.clone(),
            Arc::new(MemoryStorage::new()),
            Arc::new(LocalRegistration::default()),
        ));
        worker.start().await.unwrap();
        let app = router(ProxyState::new(worker.clone(), upstream.clone(), 1024));
        (upstream, worker, app)
    }

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn navigation(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(uri)
            .header("accept", "text/html,application/xhtml+xml")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_request_mode_inference() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_mode(&Method::GET, &headers), RequestMode::NoCors);

        headers.insert("accept", HeaderValue::from_static("text/html"));
        assert_eq!(request_mode(&Method::GET, &headers), RequestMode::Navigate);
        assert_eq!(request_mode(&Method::POST, &headers), RequestMode::NoCors);

        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        assert_eq!(request_mode(&Method::GET, &headers), RequestMode::Cors);
    }

    #[test]
    fn test_request_destination_inference() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_destination(RequestMode::NoCors, &headers), Destination::Empty);
        assert_eq!(request_destination(RequestMode::Navigate, &headers), Destination::Document);

        headers.insert("accept", HeaderValue::from_static("image/avif,image/webp,*/*"));
        assert_eq!(request_destination(RequestMode::NoCors, &headers), Destination::Image);

        headers.insert("sec-fetch-dest", HeaderValue::from_static("script"));
        assert_eq!(request_destination(RequestMode::NoCors, &headers), Destination::Script);
    }

    #[tokio::test]
    async fn test_navigation_uses_preload_fetch() {
        let (upstream, _worker, app) = started().await;
        upstream.serve("/projects/42", lantern_core::Response::new(200, "project page"));

        let response = app.oneshot(navigation("/projects/42")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "project page");
        let seen = upstream.seen_for("/projects/42");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].header(PRELOAD_HEADER), Some("true"));
        assert_eq!(seen[0].mode, RequestMode::Navigate);
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_root_document() {
        let (upstream, _worker, app) = started().await;
        upstream.set_offline(true);

        let response = app.oneshot(navigation("/projects/42?tab=layers")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "content of /");
    }

    #[tokio::test]
    async fn test_static_asset_served_from_cache_offline() {
        let (upstream, _worker, app) = started().await;
        upstream.set_offline(true);

        let request = HttpRequest::builder()
            .uri("/assets/icons/icon-192.png")
            .header("accept", "image/png")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "content of /assets/icons/icon-192.png");
    }

    #[tokio::test]
    async fn test_bypass_is_streamed_from_upstream() {
        let (upstream, worker, app) = started().await;
        upstream.serve("/twin/city.glb", lantern_core::Response::new(200, "mesh"));

        let request = HttpRequest::builder()
            .uri("/twin/city.glb")
            .header("accept", "text/html")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(body_of(response).await, "mesh");

        let seen = upstream.seen_for("/twin/city.glb");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].header(PRELOAD_HEADER), None);

        upstream.set_offline(true);
        let request = HttpRequest::builder().uri("/twin/city.glb").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        worker.settle().await;
    }

    #[tokio::test]
    async fn test_post_body_and_headers_forwarded() {
        let (upstream, _worker, app) = started().await;
        upstream.serve("/api/annotations", lantern_core::Response::new(201, "created"));

        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/annotations?layer=roads")
            .header("content-type", "application/json")
            .header("connection", "keep-alive")
            .body(Body::from("{\"note\":\"bridge\"}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let seen = upstream.seen_for("/api/annotations");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].url.query(), Some("layer=roads"));
        assert_eq!(seen[0].body.as_ref(), b"{\"note\":\"bridge\"}");
        assert_eq!(seen[0].header("content-type"), Some("application/json"));
        assert_eq!(seen[0].header("connection"), None);
    }

    #[tokio::test]
    async fn test_bypass_upload_is_not_limited() {
        let (upstream, _worker, app) = started().await;
        upstream.serve("/twin/city.glb", lantern_core::Response::new(200, "stored"));
        let upload = vec![7u8; 4096];

        let request = HttpRequest::builder()
            .method("PUT")
            .uri("/twin/city.glb")
            .body(Body::from(upload.clone()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "stored");
        let seen = upstream.seen_for("/twin/city.glb");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].body.as_ref(), upload.as_slice());

        let request = HttpRequest::builder()
            .method("PUT")
            .uri("/api/annotations")
            .body(Body::from(upload))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(upstream.seen_for("/api/annotations").is_empty());
    }
}
