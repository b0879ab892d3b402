//! Authenticated JSON client for the backend REST API.
//!
//! [`RemoteClient::request`] resolves a path under the configured API
//! prefix, runs the middleware chain, and fails with
//! [`Error::Transport`](crate::error::Error::Transport) on any non-2xx
//! status.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::client::auth::RETRY_AUTHORIZED;
use crate::client::http_middleware::{
    HttpMiddleware, HttpMiddlewareChain, HttpMiddlewareContext, HttpRequest, HttpResponse,
};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::logging::redact_authorization;

/// REST client bound to one backend.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    config: ClientConfig,
    middleware: HttpMiddlewareChain,
}

impl RemoteClient {
    /// Builds a client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            config,
            middleware: HttpMiddlewareChain::new(),
        })
    }

    /// Adds a middleware to the chain.
    pub fn with_middleware(mut self, middleware: Arc<dyn HttpMiddleware>) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// The client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a request and returns the decoded JSON body.
    ///
    /// Empty bodies decode to `Value::Null`.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] with status and body for non-2xx responses.
    /// - [`Error::Network`] when no response was received.
    /// - [`Error::Authentication`] when a token refresh failed.
    ///
    /// A 401 on a request carrying an injected token refreshes the token
    /// and sends the request once more.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        self.request_with_headers(method, path, body, &[]).await
    }

    /// Like [`request`](Self::request) with extra headers set before the
    /// middleware runs. An explicit `Authorization` header suppresses token
    /// injection.
    pub async fn request_with_headers(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let url = self.config.api_url(path)?;
        let context = HttpMiddlewareContext::new(url.as_str(), method.as_str());

        let mut outcome = self
            .execute(method.clone(), url.clone(), body, headers, &context)
            .await;
        if matches!(&outcome, Err(e) if e.status() == Some(401))
            && context.get_metadata(RETRY_AUTHORIZED).is_some()
        {
            let mut retry = context.clone();
            retry.attempt += 1;
            tracing::debug!(request_id = %retry.request_id, "retrying with refreshed token");
            outcome = self.execute(method, url, body, headers, &retry).await;
        }

        match outcome {
            Ok(value) => Ok(value),
            Err(err) => {
                self.middleware.process_error(&err, &context).await;
                Err(err)
            },
        }
    }

    async fn execute(
        &self,
        method: Method,
        url: url::Url,
        body: Option<&Value>,
        extra_headers: &[(&str, &str)],
        context: &HttpMiddlewareContext,
    ) -> Result<Value> {
        let encoded = match body {
            Some(v) => serde_json::to_vec(v)?,
            None => Vec::new(),
        };
        let mut request = HttpRequest::new(method.as_str(), url.as_str(), encoded);
        if body.is_some() {
            request.add_header(CONTENT_TYPE.as_str(), "application/json");
        }
        for (name, value) in extra_headers {
            request.add_header(name, value);
        }
        self.middleware.process_request(&mut request, context).await?;

        tracing::debug!(
            request_id = %context.request_id,
            method = %method,
            url = %url,
            authorization = %request
                .get_header("Authorization")
                .map(|v| redact_authorization(v))
                .unwrap_or_default(),
            "sending request"
        );

        let mut builder = self.http.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if body.is_some() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let bytes = response.bytes().await?;

        let mut response = HttpResponse::new(status, bytes.to_vec());
        response.headers = headers;
        self.middleware.process_response(&mut response, context).await?;

        if !response.is_success() {
            tracing::debug!(request_id = %context.request_id, status, "request failed");
            return Err(Error::transport(status, response.text()));
        }
        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| Error::protocol(format!("invalid JSON from {}: {e}", context.url)))
    }

    /// `GET` and decode.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.request(Method::GET, path, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `POST` a JSON body and decode.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let value = self.request(Method::POST, path, Some(&body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `PUT` a JSON body and decode.
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let value = self.request(Method::PUT, path, Some(&body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `DELETE`, ignoring any body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request(Method::DELETE, path, None).await?;
        Ok(())
    }
}
