//! Push channel client.
//!
//! One long-lived connection multiplexes many named channels. Callers
//! [`subscribe`](PushChannel::subscribe) to [`ChannelKey`]s and register
//! listeners that receive every decoded [`ChannelEvent`] in arrival order.
//!
//! # Lifecycle
//!
//! ```text
//! Closed --connect--> Connecting --transport up--> Open
//!   ^                     ^                         |
//!   |                     +---- reconnect delay ----+ (unexpected drop)
//!   +----------------------- close ------------------+
//! ```
//!
//! While waiting out the reconnect delay the channel reports
//! [`ChannelState::Connecting`]. Before rebuilding the connection the
//! channel asks its [`CredentialSource`] for the current token and refreshes
//! it first if it has expired. A failed refresh closes the channel.
//!
//! Subscriptions are reference counted per key: `SUBSCRIBE` goes out when a
//! key's count goes from zero to one and `UNSUBSCRIBE` when it drops back to
//! zero, so one feature's teardown never cancels another feature's interest
//! in the same key. Keys subscribed while the channel is not open are sent on
//! the next `Open` transition, and every key is re-sent after a reconnect.
//!
//! Transport errors are logged and routed to the reconnect path; they never
//! reach subscribers. Events missed while disconnected are not replayed.

pub mod memory;
#[cfg(feature = "websocket")]
pub mod websocket;

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::auth::{BearerToken, CredentialSource};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::types::event::{ChannelEvent, ChannelKey, ControlFrame};

/// Text frames arriving from the server.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Text frames going to the server.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = crate::error::Error> + Send>>;

/// Opens one connection to the push endpoint.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Connects to `url`, authenticating with `token` when given.
    async fn connect(&self, url: &Url, token: Option<&str>) -> Result<(FrameSink, FrameStream)>;
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection and no reconnect pending.
    Closed,
    /// Connecting, or waiting to reconnect.
    Connecting,
    /// Connected; control frames are sent immediately.
    Open,
}

type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

struct Shared {
    state: ChannelState,
    subscriptions: IndexMap<ChannelKey, usize>,
    listeners: Vec<(u64, Listener)>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: Option<CancellationToken>,
    // Bumped by a clean close so guards from before it release nothing.
    epoch: u64,
}

impl Shared {
    fn send(&self, frame: ControlFrame) {
        if self.state != ChannelState::Open {
            return;
        }
        let Some(outbound) = &self.outbound else {
            return;
        };
        match frame.encode() {
            Ok(text) => {
                if outbound.send(text).is_err() {
                    tracing::debug!(key = %frame.payload, "connection gone, frame dropped");
                }
            },
            Err(e) => tracing::warn!(error = %e, "failed to encode control frame"),
        }
    }
}

struct Inner {
    shared: Mutex<Shared>,
    transport: Arc<dyn ChannelTransport>,
    credentials: Mutex<Option<Arc<dyn CredentialSource>>>,
    url: Url,
    reconnect_delay: Duration,
    next_listener: AtomicU64,
}

/// Handle to the shared push connection.
///
/// Cloning is cheap; clones share the connection, listeners, and
/// subscriptions.
#[derive(Clone)]
pub struct PushChannel {
    inner: Arc<Inner>,
}

impl fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("PushChannel")
            .field("url", &self.inner.url.as_str())
            .field("state", &shared.state)
            .field("subscriptions", &shared.subscriptions.len())
            .field("listeners", &shared.listeners.len())
            .finish()
    }
}

impl PushChannel {
    /// Creates a closed channel for `url` that waits `reconnect_delay`
    /// after an unexpected drop.
    pub fn new(url: Url, transport: Arc<dyn ChannelTransport>, reconnect_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    state: ChannelState::Closed,
                    subscriptions: IndexMap::new(),
                    listeners: Vec::new(),
                    outbound: None,
                    cancel: None,
                    epoch: 0,
                }),
                transport,
                credentials: Mutex::new(None),
                url,
                reconnect_delay,
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a closed channel for the configured endpoint and delay.
    pub fn from_config(config: &ClientConfig, transport: Arc<dyn ChannelTransport>) -> Result<Self> {
        Ok(Self::new(config.ws_endpoint()?, transport, config.reconnect_delay()))
    }

    /// Sets the source asked for tokens when (re)connecting.
    pub fn set_credentials(&self, source: Arc<dyn CredentialSource>) {
        *self.inner.credentials.lock() = Some(source);
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.inner.shared.lock().state
    }

    /// Endpoint URL.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Non-owning handle, for owners the channel itself refers back to.
    pub fn downgrade(&self) -> WeakPushChannel {
        WeakPushChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Starts the connection.
    ///
    /// Idempotent: returns `false` without doing anything when the channel
    /// is already connecting or open. When `credentials` is `None` the
    /// credential source, if any, supplies the token. Must be called from
    /// within a Tokio runtime.
    pub fn connect(&self, credentials: Option<BearerToken>) -> bool {
        let token = credentials.or_else(|| self.inner.credentials().and_then(|s| s.current()));

        let cancel = {
            let mut shared = self.inner.shared.lock();
            if shared.state != ChannelState::Closed {
                return false;
            }
            let cancel = CancellationToken::new();
            shared.state = ChannelState::Connecting;
            shared.cancel = Some(cancel.clone());
            cancel
        };

        tracing::info!(url = %self.inner.url, "push channel connecting");
        tokio::spawn(run(self.inner.clone(), cancel, token));
        true
    }

    /// Tears down the connection and connects again with `credentials`,
    /// keeping listeners and subscriptions.
    pub fn reconnect(&self, credentials: Option<BearerToken>) -> bool {
        self.close(false);
        self.connect(credentials)
    }

    /// Closes the connection.
    ///
    /// With `clean` set, listeners and subscriptions are dropped as well;
    /// otherwise they are kept for the next [`connect`](Self::connect).
    pub fn close(&self, clean: bool) {
        self.inner.close(clean);
    }

    /// Subscribes to `keys`.
    ///
    /// The returned guard unsubscribes the same keys once, when dropped or
    /// cancelled.
    pub fn subscribe<I, K>(&self, keys: I) -> Subscription
    where
        I: IntoIterator<Item = K>,
        K: Into<ChannelKey>,
    {
        let keys: Vec<ChannelKey> = keys.into_iter().map(Into::into).collect();
        let mut shared = self.inner.shared.lock();
        for key in &keys {
            let count = shared.subscriptions.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                tracing::debug!(%key, "subscribing");
                shared.send(ControlFrame::subscribe(key.clone()));
            }
        }
        Subscription {
            channel: Arc::downgrade(&self.inner),
            epoch: shared.epoch,
            keys,
        }
    }

    /// Releases one reference to each of `keys`.
    ///
    /// Keys that are not subscribed are ignored.
    pub fn unsubscribe<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<ChannelKey>,
    {
        let keys: Vec<ChannelKey> = keys.into_iter().map(Into::into).collect();
        let epoch = self.inner.shared.lock().epoch;
        self.inner.release(&keys, epoch);
    }

    /// Reference count of `key`, zero when not subscribed.
    pub fn subscription_count(&self, key: &ChannelKey) -> usize {
        self.inner
            .shared
            .lock()
            .subscriptions
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Keys currently subscribed, in first-subscription order.
    pub fn subscribed_keys(&self) -> Vec<ChannelKey> {
        self.inner.shared.lock().subscriptions.keys().cloned().collect()
    }

    /// Registers a listener for every decoded event.
    ///
    /// Listeners run one at a time on the connection task, in arrival
    /// order, and must not block.
    pub fn add_listener<F>(&self, listener: F) -> ListenerGuard
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .shared
            .lock()
            .listeners
            .push((id, Arc::new(listener)));
        ListenerGuard {
            channel: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.shared.lock().listeners.len()
    }
}

/// Non-owning [`PushChannel`] handle.
#[derive(Debug, Clone, Default)]
pub struct WeakPushChannel {
    inner: Weak<Inner>,
}

impl WeakPushChannel {
    /// The channel, if still alive.
    pub fn upgrade(&self) -> Option<PushChannel> {
        self.inner.upgrade().map(|inner| PushChannel { inner })
    }
}

impl Inner {
    fn credentials(&self) -> Option<Arc<dyn CredentialSource>> {
        self.credentials.lock().clone()
    }

    fn close(&self, clean: bool) {
        let mut shared = self.shared.lock();
        if let Some(cancel) = shared.cancel.take() {
            cancel.cancel();
        }
        let was = shared.state;
        shared.outbound = None;
        shared.state = ChannelState::Closed;
        if clean {
            shared.listeners.clear();
            shared.subscriptions.clear();
            shared.epoch += 1;
        }
        if was != ChannelState::Closed {
            tracing::info!(url = %self.url, clean, "push channel closed");
        }
    }

    fn release(&self, keys: &[ChannelKey], epoch: u64) {
        let mut shared = self.shared.lock();
        if shared.epoch != epoch {
            return;
        }
        for key in keys {
            let Some(count) = shared.subscriptions.get_mut(key) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                shared.subscriptions.shift_remove(key);
                tracing::debug!(%key, "unsubscribing");
                shared.send(ControlFrame::unsubscribe(key.clone()));
            }
        }
    }

    fn remove_listener(&self, id: u64) {
        self.shared.lock().listeners.retain(|(lid, _)| *lid != id);
    }

    /// Moves to `state` unless this connection attempt was cancelled.
    fn transition(&self, cancel: &CancellationToken, state: ChannelState) -> bool {
        let mut shared = self.shared.lock();
        if cancel.is_cancelled() {
            return false;
        }
        shared.state = state;
        shared.outbound = None;
        true
    }

    /// Marks the channel open and queues `SUBSCRIBE` for every known key.
    fn open(&self, cancel: &CancellationToken) -> Option<mpsc::UnboundedReceiver<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = self.shared.lock();
        if cancel.is_cancelled() {
            return None;
        }
        shared.state = ChannelState::Open;
        shared.outbound = Some(tx);
        let keys: Vec<ChannelKey> = shared.subscriptions.keys().cloned().collect();
        for key in keys {
            shared.send(ControlFrame::subscribe(key));
        }
        Some(rx)
    }

    fn dispatch(&self, text: &str) {
        let event = match ChannelEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping push frame");
                return;
            },
        };
        tracing::debug!(kind = event.kind(), "push event");
        let listeners: Vec<Listener> = self
            .shared
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Pumps frames until the connection drops or is cancelled.
    async fn serve(&self, mut sink: FrameSink, mut stream: FrameStream, cancel: &CancellationToken) {
        let Some(mut outbound) = self.open(cancel) else {
            let _ = sink.close().await;
            return;
        };
        tracing::info!(url = %self.url, "push channel open");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = sink.close().await;
                    return;
                },
                Some(frame) = outbound.recv() => {
                    if let Err(e) = sink.send(frame).await {
                        tracing::warn!(error = %e, "push channel send failed");
                        return;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "push channel receive failed");
                        return;
                    },
                    None => {
                        tracing::warn!(url = %self.url, "push channel closed by server");
                        return;
                    },
                },
            }
        }
    }

    /// Token for the next attempt. `Err` means the channel must close.
    async fn credentials_for_reconnect(
        &self,
        previous: Option<BearerToken>,
    ) -> std::result::Result<Option<BearerToken>, ()> {
        let Some(source) = self.credentials() else {
            return Ok(previous);
        };
        match source.current() {
            Some(token) if token.is_expired() => {
                tracing::info!("session token expired, refreshing before reconnect");
                match source.refresh().await {
                    Ok(token) => Ok(Some(token)),
                    Err(e) => {
                        tracing::error!(error = %e, "token refresh failed, closing push channel");
                        Err(())
                    },
                }
            },
            Some(token) => Ok(Some(token)),
            None if previous.is_some() => {
                tracing::info!("session ended, closing push channel");
                Err(())
            },
            None => Ok(None),
        }
    }
}

async fn run(inner: Arc<Inner>, cancel: CancellationToken, mut token: Option<BearerToken>) {
    loop {
        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            connected = inner
                .transport
                .connect(&inner.url, token.as_ref().map(|t| t.token.as_str())) => connected,
        };
        match connected {
            Ok((sink, stream)) => inner.serve(sink, stream, &cancel).await,
            Err(e) => tracing::warn!(url = %inner.url, error = %e, "push channel connect failed"),
        }

        if !inner.transition(&cancel, ChannelState::Connecting) {
            return;
        }
        tracing::info!(delay_ms = inner.reconnect_delay.as_millis() as u64, "push channel reconnecting");
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(inner.reconnect_delay) => {},
        }

        match inner.credentials_for_reconnect(token.take()).await {
            Ok(next) => token = next,
            Err(()) => {
                if !cancel.is_cancelled() {
                    inner.close(true);
                }
                return;
            },
        }
    }
}

/// Keys held by one caller. Dropping the guard unsubscribes them.
#[must_use = "dropping a Subscription unsubscribes its keys"]
pub struct Subscription {
    channel: Weak<Inner>,
    epoch: u64,
    keys: Vec<ChannelKey>,
}

impl Subscription {
    /// The subscribed keys.
    pub fn keys(&self) -> &[ChannelKey] {
        &self.keys
    }

    /// Unsubscribes now.
    pub fn cancel(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("keys", &self.keys).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.release(&self.keys, self.epoch);
        }
    }
}

/// Registered listener. Dropping the guard removes it.
#[must_use = "dropping a ListenerGuard removes the listener"]
#[derive(Debug)]
pub struct ListenerGuard {
    channel: Weak<Inner>,
    id: u64,
}

impl ListenerGuard {
    /// Removes the listener now.
    pub fn remove(self) {}

    /// Keeps the listener registered for the channel's lifetime.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.remove_listener(self.id);
        }
    }
}
