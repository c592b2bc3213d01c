//! WebSocket transport.
//!
//! One JSON object per message, no termination sentinel: the outbound
//! queue closing signals end of stream, and the server-side forwarding
//! loop closes the socket when the queue drains.

use crate::events::StreamEvent;
use crate::transport::TransportAdapter;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// WebSocket transport writing event JSON into an outbound queue.
pub struct WebSocketTransport {
    tx: Mutex<Option<mpsc::Sender<String>>>,
}

impl WebSocketTransport {
    /// Create a transport and the message receiver it feeds.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl TransportAdapter for WebSocketTransport {
    async fn send_event(&self, event: StreamEvent) {
        let sender = { self.tx.lock().await.clone() };
        let Some(sender) = sender else {
            return;
        };
        if sender.send(event.to_json()).await.is_err() {
            debug!("WebSocket client disconnected, dropping further events");
            *self.tx.lock().await = None;
        }
    }

    async fn close(&self) {
        // Dropping the sender ends the receiver stream.
        self.tx.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::Value;

    #[tokio::test]
    async fn test_send_delivers_bare_json() {
        let (transport, mut rx) = WebSocketTransport::new(8);
        transport
            .send_event(StreamEvent::new(EventKind::FinalResponse, "seq-1").content("answer"))
            .await;

        let message = rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&message).unwrap();
        assert_eq!(value["type"], "final_response");
        assert_eq!(value["content"], "answer");
    }

    #[tokio::test]
    async fn test_close_ends_stream_without_sentinel() {
        let (transport, mut rx) = WebSocketTransport::new(8);
        transport
            .send_event(StreamEvent::new(EventKind::Metadata, "seq-1"))
            .await;
        transport.close().await;

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_is_noop() {
        let (transport, mut rx) = WebSocketTransport::new(8);
        transport.close().await;
        transport
            .send_event(StreamEvent::new(EventKind::ContentChunk, "seq-1"))
            .await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_disconnect_is_noop() {
        let (transport, rx) = WebSocketTransport::new(8);
        drop(rx);
        transport
            .send_event(StreamEvent::new(EventKind::ContentChunk, "seq-1"))
            .await;
        transport.close().await;
    }
}
