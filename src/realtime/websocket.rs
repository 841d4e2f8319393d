//! WebSocket transport for socket.io servers

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct SocketTransport {
    stream: WsStream,
}

/// Websocket endpoint for a socket.io server base URL.
///
/// `http://host:3003` becomes `ws://host:3003/socket.io/?EIO=4&transport=websocket`.
pub fn socketio_url(base: &str) -> Result<String> {
    let mut url = url::Url::parse(base).with_context(|| format!("Invalid socket URL {}", base))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("Cannot use scheme {} for {}", scheme, base))?;

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

impl SocketTransport {
    /// Open the websocket. Auth happens afterwards, in the socket.io connect packet.
    pub async fn connect(base: &str) -> Result<Self> {
        let ws_url = socketio_url(base)?;
        tracing::debug!("Connecting WebSocket to {}", ws_url);

        let (stream, response) = connect_async(&ws_url)
            .await
            .context("WebSocket connection failed")?;

        tracing::debug!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, msg: &str) -> Result<()> {
        tracing::trace!("WS send: {}", msg);
        self.stream
            .send(Message::Text(msg.to_string()))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Receive the next text frame, answering websocket-level pings.
    ///
    /// Returns `None` once the peer closes.
    pub async fn recv_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::trace!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socketio_url() {
        assert_eq!(
            socketio_url("http://localhost:3003").unwrap(),
            "ws://localhost:3003/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socketio_url("https://chat.example.com/realtime/").unwrap(),
            "wss://chat.example.com/realtime/socket.io/?EIO=4&transport=websocket"
        );
        assert!(socketio_url("not a url").is_err());
    }
}
