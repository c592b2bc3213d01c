//! Event delivery to clients.
//!
//! The engine emits into a `TransportAdapter` and never branches on which
//! transport is behind it. Both implementations deliver events in FIFO
//! order through an outbound queue; the adapter owns only that queue,
//! never run state.
//!
//! A disconnected or closed transport is terminal but not fatal: sends
//! become silent no-ops and in-flight work runs to completion with its
//! output discarded.

pub mod sse;
pub mod websocket;

use crate::events::StreamEvent;
use async_trait::async_trait;

pub use sse::{sse_stream, SseTransport};
pub use websocket::WebSocketTransport;

/// Ordered event delivery to one client.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Queue one event for delivery. After `close()` or a client
    /// disconnect this is a silent no-op.
    async fn send_event(&self, event: StreamEvent);

    /// Terminate the stream. Idempotent.
    async fn close(&self);
}
