//! Room transport
//!
//! One WebSocket per room membership, carrying text frames with one JSON
//! event envelope each.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use syncsong_common::SyncEvent;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derive the room channel endpoint from the authority's HTTP base URL
///
/// `http://host:8000` becomes `ws://host:8000/ws/ROOM`; `https` maps to `wss`.
pub fn room_endpoint(server_url: &str, room_code: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .map_err(|e| Error::Config(format!("Invalid server URL {}: {}", server_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::Config(format!(
                "Unsupported server URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("Cannot use scheme {} for {}", scheme, server_url)))?;

    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}/ws/{}", base, room_code));
    url.set_query(None);
    Ok(url)
}

/// Open the room channel and split it into its two halves
pub async fn connect(endpoint: &Url) -> Result<(RoomSender, RoomReceiver)> {
    debug!("Connecting to {}", endpoint);
    let (socket, _response) = connect_async(endpoint.as_str())
        .await
        .map_err(|e| Error::Transport(format!("Connect to {} failed: {}", endpoint, e)))?;

    let (sink, stream) = socket.split();
    Ok((RoomSender { sink }, RoomReceiver { stream }))
}

pub struct RoomSender {
    sink: SplitSink<Socket, Message>,
}

impl RoomSender {
    pub async fn send(&mut self, event: &SyncEvent) -> Result<()> {
        let text = event.to_json()?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::Transport(format!("Send failed: {}", e)))
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            debug!("Close frame not sent: {}", e);
        }
    }
}

pub struct RoomReceiver {
    stream: SplitStream<Socket>,
}

impl RoomReceiver {
    /// Next decoded event
    ///
    /// Returns `Ok(None)` when the channel closed. Malformed envelopes are
    /// logged and skipped; they never end the session.
    pub async fn next_event(&mut self) -> Result<Option<SyncEvent>> {
        while let Some(message) = self.stream.next().await {
            let message =
                message.map_err(|e| Error::Transport(format!("Receive failed: {}", e)))?;
            match message {
                Message::Text(text) => match SyncEvent::from_json(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!("Dropping malformed frame: {}", e),
                },
                Message::Close(_) => return Ok(None),
                // Pings are answered by tungstenite
                _ => {}
            }
        }
        Ok(None)
    }
}
