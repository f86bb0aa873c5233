//! # HTTP Transport
//!
//! The one seam through which every remote operation leaves the process.
//!
//! ## Layering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Bootstrapper   UpdateChecker   Fetcher                               │
//! │        │               │            │                                   │
//! │        └───────────────┼────────────┘                                   │
//! │                        ▼                                                │
//! │              dyn HttpTransport::send(HttpRequest)                       │
//! │                        │                                                │
//! │          ┌─────────────┴──────────────┐                                 │
//! │          ▼                            ▼                                 │
//! │   ReqwestTransport              MockTransport                           │
//! │   (production, timeout)         (scripted routes, records requests)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport never interprets status codes. A 404 or 500 is a successful
//! exchange; only connection failures and timeouts are a [`TransportError`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{QConfigError, QConfigResult};

// =============================================================================
// Request / Response
// =============================================================================

/// HTTP method used by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Request body variants.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL without query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    /// Returns the value of a request header (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body as text, if it is a text body.
    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            Some(RequestBody::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// A completed exchange, whatever its status.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Returns a response header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            timed_out: true,
        }
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Sends HTTP requests on behalf of the engine.
///
/// Implementations must enforce their own request timeout; the engine has no
/// cancellation of its own.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// =============================================================================
// Reqwest Transport
// =============================================================================

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport whose requests fail after `timeout`.
    pub fn new(timeout: Duration) -> QConfigResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QConfigError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        Ok(ReqwestTransport { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Text(text)) => builder
                .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(text),
            None => builder,
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let raw = response.bytes().await.map_err(map_reqwest_error)?;
        let body = decode_body(&request.url, &raw)?;

        debug!(method = %request.method, url = %request.url, status, "HTTP exchange complete");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Decodes a response body as UTF-8, rejecting anything else instead of
/// substituting replacement characters.
fn decode_body(url: &str, raw: &[u8]) -> Result<String, TransportError> {
    String::from_utf8(raw.to_vec()).map_err(|e| {
        warn!(%url, bytes = raw.len(), "Response body is not valid UTF-8");
        TransportError::new(format!(
            "response body from {} is not valid UTF-8 (at byte {})",
            url,
            e.utf8_error().valid_up_to()
        ))
    })
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(err.to_string())
    } else {
        TransportError::new(err.to_string())
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// A scripted transport for testing.
///
/// Routes match on method and URL suffix; the most recently added matching
/// route wins. Every request is recorded, matched or not.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Creates a mock transport with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes requests whose URL ends with `path` to `handler`.
    pub fn on<F>(&self, method: Method, path: impl Into<String>, handler: F)
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        self.routes.lock().push(Route {
            method,
            path: path.into(),
            handler: Box::new(handler),
        });
    }

    /// Answers every matching request with a copy of `response`.
    pub fn respond(&self, method: Method, path: impl Into<String>, response: HttpResponse) {
        self.on(method, path, move |_| Ok(response.clone()));
    }

    /// Fails every matching request as if the connection dropped.
    pub fn fail(&self, method: Method, path: impl Into<String>, message: impl Into<String>) {
        let error = TransportError::new(message);
        self.on(method, path, move |_| Err(error.clone()));
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Counts requests whose URL ends with `path`.
    pub fn request_count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());

        let routes = self.routes.lock();
        let route = routes
            .iter()
            .rev()
            .find(|r| r.method == request.method && request.url.ends_with(&r.path));

        match route {
            Some(route) => (route.handler)(&request),
            None => Err(TransportError::new(format!(
                "no mock route for {} {}",
                request.method, request.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body_rejects_invalid_utf8() {
        assert_eq!(decode_body("http://a/x", "k=välue".as_bytes()).unwrap(), "k=välue");

        let err = decode_body("http://a/x", b"k=\xff\xfe").unwrap_err();
        assert!(err.message.contains("not valid UTF-8"));
        assert!(err.message.contains("byte 2"));
        assert!(!err.timed_out);
    }

    #[tokio::test]
    async fn test_mock_routes_by_method_and_suffix() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/entrypoint", HttpResponse::new(200, "http://a"));

        let resp = mock
            .send(HttpRequest::get("http://ctl/entrypoint"))
            .await
            .unwrap();
        assert_eq!(resp.body, "http://a");

        let err = mock
            .send(HttpRequest::post("http://ctl/entrypoint"))
            .await
            .unwrap_err();
        assert!(err.message.contains("no mock route"));
        assert_eq!(mock.request_count("/entrypoint"), 2);
    }

    #[tokio::test]
    async fn test_mock_latest_route_wins() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/x", HttpResponse::new(200, "old"));
        mock.respond(Method::Get, "/x", HttpResponse::new(200, "new"));

        let resp = mock.send(HttpRequest::get("http://h/x")).await.unwrap();
        assert_eq!(resp.body, "new");
    }

    #[test]
    fn test_response_headers_case_insensitive() {
        let resp = HttpResponse::new(200, "").with_header("Version", "3");
        assert_eq!(resp.header("version"), Some("3"));
        assert_eq!(resp.header("VERSION"), Some("3"));
        assert!(resp.is_success());
        assert!(!HttpResponse::new(304, "").is_success());
    }

    #[test]
    fn test_request_builders() {
        let req = HttpRequest::get("http://h/client/forceloadv2")
            .header("token", "st")
            .query("group", "demo")
            .query("dataId", "a.properties");
        assert_eq!(req.header_value("TOKEN"), Some("st"));
        assert_eq!(req.query_value("dataId"), Some("a.properties"));
        assert!(req.text_body().is_none());
    }
}
