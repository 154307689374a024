//! Test WebSocket client.
//!
//! Sends raw JSON events (exercising the wire format directly) and parses
//! received frames into `ServerEvent`s.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tawkd::events::ServerEvent;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test client over a live WebSocket.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws })
    }

    /// Send a raw JSON event.
    pub async fn send_json(&mut self, value: serde_json::Value) -> anyhow::Result<()> {
        self.ws.send(WsMessage::Text(value.to_string())).await?;
        Ok(())
    }

    /// Receive a single server event.
    pub async fn recv(&mut self) -> anyhow::Result<ServerEvent> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a server event with a timeout, skipping non-text frames.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ServerEvent> {
        timeout(dur, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(WsMessage::Text(raw))) => {
                        return serde_json::from_str::<ServerEvent>(&raw)
                            .map_err(|e| anyhow::anyhow!("parse error: {e} in {raw}"));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(anyhow::anyhow!("read error: {e}")),
                    None => return Err(anyhow::anyhow!("connection closed")),
                }
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for server event"))?
    }

    /// Assert that no event arrives within `dur`.
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match timeout(dur, self.ws.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(WsMessage::Text(raw)))) => {
                anyhow::bail!("expected silence, received: {raw}")
            }
            Ok(_) => Ok(()),
        }
    }

    /// Close the connection.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
