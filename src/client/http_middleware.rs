//! Request/response middleware for the REST client.
//!
//! Middleware runs around every call made by
//! [`RemoteClient`](crate::client::remote::RemoteClient): header injection
//! (bearer tokens, correlation ids), status inspection, and logging.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Per-call context shared by every middleware in the chain.
#[derive(Debug, Clone)]
pub struct HttpMiddlewareContext {
    /// Correlation id for this call.
    pub request_id: String,
    /// URL being requested.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Attempt number, starting at 0.
    pub attempt: u32,
    /// Free-form metadata.
    pub metadata: Arc<RwLock<HashMap<String, String>>>,
}

impl HttpMiddlewareContext {
    /// Creates a context with a fresh correlation id.
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            method: method.into(),
            attempt: 0,
            metadata: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Sets a metadata value.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.write().insert(key.into(), value.into());
    }

    /// Reads a metadata value.
    pub fn get_metadata(&self, key: &str) -> Option<String> {
        self.metadata.read().get(key).cloned()
    }
}

/// Outgoing request as seen by middleware.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Headers, keyed case-sensitively as inserted.
    pub headers: HashMap<String, String>,
    /// Encoded body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a request with no headers.
    pub fn new(method: impl Into<String>, url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body,
        }
    }

    /// Sets a header.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Reads a header, case-insensitively.
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Returns `true` if the header is present.
    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }
}

/// Incoming response as seen by middleware.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Hook into every REST call.
///
/// # Examples
///
/// ```rust
/// use studyhub::client::http_middleware::{HttpMiddleware, HttpMiddlewareContext, HttpRequest};
/// use async_trait::async_trait;
///
/// struct ClientTag;
///
/// #[async_trait]
/// impl HttpMiddleware for ClientTag {
///     async fn on_request(
///         &self,
///         request: &mut HttpRequest,
///         _context: &HttpMiddlewareContext,
///     ) -> studyhub::Result<()> {
///         request.add_header("X-Client", "studyhub");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait HttpMiddleware: Send + Sync {
    /// Called before the request is sent.
    async fn on_request(
        &self,
        request: &mut HttpRequest,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        let _ = (request, context);
        Ok(())
    }

    /// Called after a response is received, in reverse chain order.
    async fn on_response(
        &self,
        response: &mut HttpResponse,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        let _ = (response, context);
        Ok(())
    }

    /// Called when the call failed.
    async fn on_error(&self, error: &Error, context: &HttpMiddlewareContext) -> Result<()> {
        let _ = (error, context);
        Ok(())
    }

    /// Ordering key, lower runs first.
    fn priority(&self) -> i32 {
        50
    }
}

/// Ordered middleware chain.
#[derive(Clone, Default)]
pub struct HttpMiddlewareChain {
    middlewares: Vec<Arc<dyn HttpMiddleware>>,
}

impl HttpMiddlewareChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware, keeping the chain sorted by priority.
    pub fn add(&mut self, middleware: Arc<dyn HttpMiddleware>) {
        self.middlewares.push(middleware);
        self.middlewares.sort_by_key(|m| m.priority());
    }

    /// Number of middlewares.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `on_request` in priority order.
    pub async fn process_request(
        &self,
        request: &mut HttpRequest,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        for middleware in &self.middlewares {
            middleware.on_request(request, context).await?;
        }
        Ok(())
    }

    /// Runs `on_response` in reverse priority order.
    pub async fn process_response(
        &self,
        response: &mut HttpResponse,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        for middleware in self.middlewares.iter().rev() {
            middleware.on_response(response, context).await?;
        }
        Ok(())
    }

    /// Runs `on_error` on every middleware; their own failures are logged.
    pub async fn process_error(&self, error: &Error, context: &HttpMiddlewareContext) {
        for middleware in &self.middlewares {
            if let Err(e) = middleware.on_error(error, context).await {
                tracing::warn!(error = %e, "error middleware failed");
            }
        }
    }
}

impl std::fmt::Debug for HttpMiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMiddlewareChain")
            .field("count", &self.middlewares.len())
            .finish()
    }
}
