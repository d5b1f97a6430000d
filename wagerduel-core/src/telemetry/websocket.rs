use super::{TelemetryEvent, TelemetrySink};
use crate::error::{Result, WagerError};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Streams events as JSON text frames to a websocket endpoint.
///
/// Publishing only queues the frame; a background task owns the socket.
pub struct WebSocketSink {
    url: String,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl WebSocketSink {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| WagerError::telemetry(format!("failed to connect to {}: {}", url, e)))?;
        let (mut sink, mut incoming) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let endpoint = url.to_string();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!("Telemetry connection to {} failed: {}", endpoint, e);
                    return;
                }
            }
            let _ = sink.close().await;
            tracing::debug!("Telemetry connection to {} closed", endpoint);
        });

        // keep reading so control frames are answered
        tokio::spawn(async move { while let Some(Ok(_)) = incoming.next().await {} });

        tracing::info!("Connected to telemetry at {}", url);
        Ok(Self {
            url: url.to_string(),
            outgoing: Mutex::new(Some(tx)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TelemetrySink for WebSocketSink {
    fn publish(&self, event: &TelemetryEvent) -> Result<()> {
        let payload = event.to_json()?;
        let outgoing = self.outgoing.lock();
        let tx = outgoing
            .as_ref()
            .ok_or_else(|| WagerError::telemetry("sink closed"))?;
        tx.send(Message::Text(payload))
            .map_err(|_| WagerError::telemetry(format!("connection to {} dropped", self.url)))
    }

    fn close(&self) {
        self.outgoing.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn test_events_arrive_as_text_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let receiver = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut frames = Vec::new();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(text) => frames.push(text),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frames
        });

        let sink = WebSocketSink::connect(&format!("ws://{}", addr)).await.unwrap();
        sink.publish(&TelemetryEvent::PlayerJoin {
            side: Side::A,
            name: "alice".to_string(),
        })
        .unwrap();
        sink.publish(&TelemetryEvent::SwitchSides(-400)).unwrap();
        sink.close();
        assert!(sink.publish(&TelemetryEvent::SwitchSides(1)).is_err());

        let frames = receiver.await.unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("\"playerjoin\""));
        assert!(frames[1].contains("\"switchsides\""));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WebSocketSink::connect(&format!("ws://{}", addr)).await;
        assert!(matches!(result, Err(WagerError::Telemetry(_))));
    }
}
