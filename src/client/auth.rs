//! Bearer token handling for the REST client and the push channel.
//!
//! - [`BearerToken`] reads its expiry from the JWT `exp` claim.
//! - [`CredentialSource`] is implemented by whoever owns the session; the
//!   REST middleware and the push channel both ask it for a token and for a
//!   refresh, and never reach into session logic themselves.
//! - [`AuthMiddleware`] injects the token before each request and refreshes
//!   it first when it expires within the configured window.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::client::http_middleware::{
    HttpMiddleware, HttpMiddlewareContext, HttpRequest, HttpResponse,
};
use crate::error::{Error, Result};

/// An access token with its optional expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    /// The raw token.
    pub token: String,
    /// Expiry, when known.
    pub expires_at: Option<SystemTime>,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<u64>,
}

impl BearerToken {
    /// Creates a token with no known expiry.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Creates a token that expires `expires_in` from now.
    pub fn with_expiry(token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(SystemTime::now() + expires_in),
        }
    }

    /// Creates a token whose expiry is read from its JWT `exp` claim.
    ///
    /// The signature is not checked; the server stays authoritative. Tokens
    /// that are not JWTs get no expiry.
    pub fn from_jwt(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = jwt_expiry(&token);
        Self { token, expires_at }
    }

    /// Returns `true` once the expiry has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| SystemTime::now() >= at)
    }

    /// Returns `true` if the token expires within `threshold`.
    pub fn expires_soon(&self, threshold: Duration) -> bool {
        match self.expires_at {
            Some(at) => match at.duration_since(SystemTime::now()) {
                Ok(remaining) => remaining < threshold,
                Err(_) => true,
            },
            None => false,
        }
    }

    /// `Authorization` header value.
    pub fn to_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

fn jwt_expiry(token: &str) -> Option<SystemTime> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    claims.exp.map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
}

/// Access and refresh tokens as returned by `/login` and `/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Authenticated user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<u64>,
}

impl TokenPair {
    /// The access token with its decoded expiry.
    pub fn access(&self) -> BearerToken {
        BearerToken::from_jwt(self.access_token.clone())
    }

    /// The refresh token with its decoded expiry.
    pub fn refresh(&self) -> BearerToken {
        BearerToken::from_jwt(self.refresh_token.clone())
    }
}

/// Supplies credentials to the REST client and the push channel.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The current access token, `None` when logged out.
    fn current(&self) -> Option<BearerToken>;

    /// Obtains a fresh access token.
    ///
    /// When this fails the implementor ends the session before returning.
    async fn refresh(&self) -> Result<BearerToken>;

    /// Obtains a token to replace `rejected`, which the server answered
    /// with 401 even though it had not expired locally.
    ///
    /// Defaults to [`refresh`](Self::refresh).
    async fn refresh_rejected(&self, rejected: &str) -> Result<BearerToken> {
        let _ = rejected;
        self.refresh().await
    }
}

/// Context metadata key holding the token injected into the request.
pub(crate) const INJECTED_TOKEN: &str = "auth.injected";

/// Context metadata key set when a 401 was answered with a new token and
/// the request may be sent once more.
pub const RETRY_AUTHORIZED: &str = "auth.retry";

/// Injects the session's bearer token, refreshing it first when needed.
pub struct AuthMiddleware {
    source: Arc<dyn CredentialSource>,
    refresh_threshold: Duration,
}

impl AuthMiddleware {
    /// Creates the middleware with a 60 second refresh window.
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            refresh_threshold: Duration::from_secs(60),
        }
    }

    /// Sets the refresh window.
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }
}

impl std::fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMiddleware")
            .field("refresh_threshold", &self.refresh_threshold)
            .field("logged_in", &self.source.current().is_some())
            .finish()
    }
}

#[async_trait]
impl HttpMiddleware for AuthMiddleware {
    async fn on_request(
        &self,
        request: &mut HttpRequest,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        if request.has_header("Authorization") {
            tracing::debug!(url = %context.url, "authorization already set, not injecting");
            return Ok(());
        }

        let Some(mut token) = self.source.current() else {
            return Ok(());
        };

        if token.expires_soon(self.refresh_threshold) {
            tracing::debug!("access token expiring, refreshing before request");
            token = self.source.refresh().await.map_err(|e| {
                Error::authentication(format!("token refresh failed: {e}"))
            })?;
            context.set_metadata("auth.refreshed", "true");
        }

        request.add_header("Authorization", &token.to_header_value());
        context.set_metadata(INJECTED_TOKEN, token.token);
        Ok(())
    }

    async fn on_response(
        &self,
        response: &mut HttpResponse,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        if response.status != 401 {
            return Ok(());
        }
        context.set_metadata("auth_failure", "true");
        tracing::warn!(method = %context.method, url = %context.url, "request rejected as unauthorized");

        let Some(rejected) = context.get_metadata(INJECTED_TOKEN) else {
            return Ok(());
        };
        if context.attempt > 0 {
            return Ok(());
        }
        self.source
            .refresh_rejected(&rejected)
            .await
            .map_err(|e| Error::authentication(format!("token refresh failed: {e}")))?;
        context.set_metadata(RETRY_AUTHORIZED, "true");
        Ok(())
    }

    fn priority(&self) -> i32 {
        10
    }
}
