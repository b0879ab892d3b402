//! WebSocket transport built on `tokio-tungstenite`.
//!
//! The access token travels as the `token` query parameter, which is how the
//! backend authenticates push connections.

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::channel::{ChannelTransport, FrameSink, FrameStream};
use crate::error::{Error, Result};

/// Connects over `ws://` or `wss://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    pub fn new() -> Self {
        Self
    }
}

fn authenticated_url(url: &Url, token: Option<&str>) -> Url {
    let mut url = url.clone();
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    url
}

#[async_trait]
impl ChannelTransport for WebSocketTransport {
    async fn connect(&self, url: &Url, token: Option<&str>) -> Result<(FrameSink, FrameStream)> {
        let target = authenticated_url(url, token);
        let (ws, response) = tokio_tungstenite::connect_async(target.as_str()).await?;
        tracing::debug!(url = %url, status = response.status().as_u16(), "websocket handshake complete");

        let (write, read) = ws.split();
        let sink = write
            .with(|frame: String| future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::text(frame))))
            .sink_map_err(Error::from);
        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_string())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "websocket close frame");
                    None
                },
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
