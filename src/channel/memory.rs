//! In-process transport.
//!
//! Every [`connect`](ChannelTransport::connect) hands a [`ServerEnd`] to the
//! paired [`MemoryListener`], which plays the server: it reads control frames
//! the client sent and pushes event frames back. Dropping a `ServerEnd` ends
//! the client's frame stream, which the channel treats as an unexpected drop.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::channel::mpsc as frames;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use url::Url;

use crate::channel::{ChannelTransport, FrameSink, FrameStream};
use crate::error::{Error, Result};

/// Client side of the in-process transport.
#[derive(Debug)]
pub struct MemoryTransport {
    accept: mpsc::UnboundedSender<ServerEnd>,
    refuse: AtomicUsize,
}

/// Server side, receiving one [`ServerEnd`] per connection.
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<ServerEnd>,
}

/// One accepted connection, seen from the server.
#[derive(Debug)]
pub struct ServerEnd {
    token: Option<String>,
    url: Url,
    from_client: frames::UnboundedReceiver<String>,
    to_client: frames::UnboundedSender<Result<String>>,
}

impl MemoryTransport {
    /// Creates a connected transport and listener.
    pub fn pair() -> (Self, MemoryListener) {
        let (accept, incoming) = mpsc::unbounded_channel();
        (
            Self {
                accept,
                refuse: AtomicUsize::new(0),
            },
            MemoryListener { incoming },
        )
    }

    /// Fails the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    async fn connect(&self, url: &Url, token: Option<&str>) -> Result<(FrameSink, FrameStream)> {
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::ChannelClosed("connection refused".to_string()));
        }

        let (client_tx, from_client) = frames::unbounded::<String>();
        let (to_client, client_rx) = frames::unbounded::<Result<String>>();
        let server = ServerEnd {
            token: token.map(str::to_string),
            url: url.clone(),
            from_client,
            to_client,
        };
        self.accept
            .send(server)
            .map_err(|_| Error::ChannelClosed("listener dropped".to_string()))?;

        let sink: FrameSink =
            Box::pin(client_tx.sink_map_err(|e| Error::ChannelClosed(e.to_string())));
        let stream: FrameStream = Box::pin(client_rx);
        Ok((sink, stream))
    }
}

impl MemoryListener {
    /// Waits for the next connection. `None` once the transport is gone.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.incoming.recv().await
    }
}

impl ServerEnd {
    /// Token the client connected with.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// URL the client connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Next frame sent by the client. `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    /// Pushes a frame to the client.
    pub async fn send(&mut self, frame: impl Into<String>) -> Result<()> {
        self.to_client
            .send(Ok(frame.into()))
            .await
            .map_err(|e| Error::ChannelClosed(e.to_string()))
    }

    /// Fails the client's stream with a transport error.
    pub async fn fail(&mut self, message: &str) -> Result<()> {
        self.to_client
            .send(Err(Error::ChannelClosed(message.to_string())))
            .await
            .map_err(|e| Error::ChannelClosed(e.to_string()))
    }
}
