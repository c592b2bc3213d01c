//! Server-Sent Events transport.
//!
//! Frames each event as a `data: {json}\n\n` block, terminates the stream
//! with the literal `data: [DONE]` sentinel, and emits a comment line
//! during idle periods so proxies do not drop the connection.

use crate::events::{StreamEvent, SSE_DONE, SSE_KEEPALIVE};
use crate::transport::TransportAdapter;
use async_trait::async_trait;
use futures::Stream;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Idle interval after which a keepalive comment is emitted.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// SSE transport writing framed events into an outbound queue.
///
/// The paired receiver is consumed by `sse_stream`, which the server
/// turns into a `text/event-stream` response body.
pub struct SseTransport {
    tx: Mutex<Option<mpsc::Sender<String>>>,
}

impl SseTransport {
    /// Create a transport and the frame receiver it feeds.
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
impl TransportAdapter for SseTransport {
    async fn send_event(&self, event: StreamEvent) {
        let sender = { self.tx.lock().await.clone() };
        let Some(sender) = sender else {
            return;
        };
        if sender.send(event.to_sse()).await.is_err() {
            // Receiver gone: client disconnected. Stop emitting.
            debug!("SSE client disconnected, dropping further events");
            *self.tx.lock().await = None;
        }
    }

    async fn close(&self) {
        let sender = { self.tx.lock().await.take() };
        if let Some(sender) = sender {
            let _ = sender.send(SSE_DONE.to_string()).await;
        }
    }
}

/// Turn the frame receiver into the response stream, injecting a
/// keepalive comment whenever no frame arrives within the idle interval.
pub fn sse_stream(rx: mpsc::Receiver<String>) -> impl Stream<Item = String> {
    futures::stream::unfold(rx, |mut rx| async move {
        match tokio::time::timeout(KEEPALIVE_INTERVAL, rx.recv()).await {
            Ok(Some(frame)) => Some((frame, rx)),
            Ok(None) => None,
            Err(_) => Some((SSE_KEEPALIVE.to_string(), rx)),
        }
    })
}
