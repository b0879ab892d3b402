//! Authenticated session.
//!
//! [`Session`] owns the token pair. It logs in, refreshes the access token
//! with the refresh token, and on any refresh failure logs out: credentials
//! are cleared, the attached push channel is closed cleanly, and
//! [`SessionEvent::LoggedOut`] is broadcast.
//!
//! The REST client and the push channel reach the session only through
//! [`CredentialSource`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::channel::{PushChannel, WeakPushChannel};
use crate::client::auth::{BearerToken, CredentialSource, TokenPair};
use crate::client::remote::RemoteClient;
use crate::error::{Error, Result};
use crate::state::{storage_key, PreferenceStore};

const AUTH_KEY: &str = "auth";

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were obtained by login or restored from storage.
    LoggedIn {
        /// Authenticated user id.
        user: Option<u64>,
    },
    /// The access token was renewed.
    Refreshed,
    /// Credentials were cleared.
    LoggedOut,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Credential owner for one user.
pub struct Session {
    client: RemoteClient,
    tokens: RwLock<Option<TokenPair>>,
    refresh_gate: tokio::sync::Mutex<()>,
    channel: Mutex<WeakPushChannel>,
    store: Option<(Arc<dyn PreferenceStore>, String)>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("persisted", &self.store.is_some())
            .finish()
    }
}

impl Session {
    /// Creates a logged-out session.
    ///
    /// `client` must not carry an
    /// [`AuthMiddleware`](crate::client::auth::AuthMiddleware) bound to this
    /// session; the session sets its own `Authorization` headers.
    pub fn new(client: RemoteClient) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            client,
            tokens: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            channel: Mutex::new(WeakPushChannel::default()),
            store: None,
            events,
        }
    }

    /// Persists the token pair in `store` under `{storage_prefix}:auth`.
    pub fn with_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        let prefix = self.client.config().storage_prefix.clone();
        self.store = Some((store, storage_key(&prefix, None, AUTH_KEY)));
        self
    }

    /// Closes `channel` on logout.
    pub fn attach_channel(&self, channel: &PushChannel) {
        *self.channel.lock() = channel.downgrade();
    }

    /// Receives session events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The current token pair.
    pub fn tokens(&self) -> Option<TokenPair> {
        self.tokens.read().clone()
    }

    /// Returns `true` while credentials are held.
    pub fn is_authenticated(&self) -> bool {
        self.tokens.read().is_some()
    }

    /// Authenticated user id.
    pub fn user(&self) -> Option<u64> {
        self.tokens.read().as_ref().and_then(|t| t.user)
    }

    /// Loads a token pair saved by an earlier session.
    ///
    /// Returns `true` if credentials were restored.
    pub fn restore(&self) -> bool {
        let Some((store, key)) = &self.store else {
            return false;
        };
        let Some(raw) = store.get(key) else {
            return false;
        };
        match serde_json::from_str::<TokenPair>(&raw) {
            Ok(pair) if !pair.refresh().is_expired() => {
                let user = pair.user;
                *self.tokens.write() = Some(pair);
                tracing::info!(?user, "session restored");
                let _ = self.events.send(SessionEvent::LoggedIn { user });
                true
            },
            Ok(_) => {
                tracing::info!("stored session expired");
                store.remove(key);
                false
            },
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable stored session");
                store.remove(key);
                false
            },
        }
    }

    /// Logs in with a username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let pair: TokenPair = self
            .client
            .post("login", &LoginRequest { username, password })
            .await
            .map_err(|e| match e {
                Error::Transport(t) => {
                    Error::authentication(format!("login rejected: HTTP {}", t.status))
                },
                other => other,
            })?;
        self.store_tokens(pair.clone());
        tracing::info!(user = ?pair.user, "logged in");
        let _ = self.events.send(SessionEvent::LoggedIn { user: pair.user });
        Ok(pair)
    }

    /// Renews the token pair with the refresh token.
    ///
    /// Concurrent callers share one refresh request. On failure the session
    /// is logged out before the error is returned.
    pub async fn refresh_tokens(&self) -> Result<TokenPair> {
        let seen = self.tokens().map(|t| t.access_token);
        let _gate = self.refresh_gate.lock().await;

        let Some(current) = self.tokens() else {
            return Err(Error::authentication("not logged in"));
        };
        if seen.as_deref() != Some(current.access_token.as_str()) {
            return Ok(current);
        }

        let bearer = current.refresh().to_header_value();
        let refreshed = self
            .client
            .request_with_headers(Method::POST, "refresh", None, &[("Authorization", bearer.as_str())])
            .await
            .and_then(|value| Ok(serde_json::from_value::<TokenPair>(value)?));

        match refreshed {
            Ok(mut pair) => {
                if pair.user.is_none() {
                    pair.user = current.user;
                }
                self.store_tokens(pair.clone());
                tracing::debug!("access token refreshed");
                let _ = self.events.send(SessionEvent::Refreshed);
                Ok(pair)
            },
            Err(e) => {
                tracing::error!(error = %e, "token refresh failed, logging out");
                self.logout();
                Err(Error::authentication(format!("token refresh failed: {e}")))
            },
        }
    }

    /// Clears credentials and closes the push channel.
    pub fn logout(&self) {
        let had_tokens = self.tokens.write().take().is_some();
        if let Some((store, key)) = &self.store {
            store.remove(key);
        }
        let channel = self.channel.lock().upgrade();
        if let Some(channel) = channel {
            channel.close(true);
        }
        if had_tokens {
            tracing::info!("logged out");
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
    }

    fn store_tokens(&self, pair: TokenPair) {
        if let Some((store, key)) = &self.store {
            match serde_json::to_string(&pair) {
                Ok(raw) => store.set(key, raw),
                Err(e) => tracing::warn!(error = %e, "could not persist session"),
            }
        }
        *self.tokens.write() = Some(pair);
    }
}

#[async_trait]
impl CredentialSource for Session {
    fn current(&self) -> Option<BearerToken> {
        self.tokens.read().as_ref().map(TokenPair::access)
    }

    /// Returns the current token if another caller already renewed it,
    /// otherwise refreshes.
    async fn refresh(&self) -> Result<BearerToken> {
        let threshold = self.client.config().refresh_threshold();
        if let Some(token) = self.current() {
            if !token.expires_soon(threshold) {
                return Ok(token);
            }
        }
        Ok(self.refresh_tokens().await?.access())
    }

    /// Refreshes unless another caller already replaced `rejected`.
    async fn refresh_rejected(&self, rejected: &str) -> Result<BearerToken> {
        if let Some(token) = self.current() {
            if token.token != rejected {
                return Ok(token);
            }
        }
        Ok(self.refresh_tokens().await?.access())
    }
}
