//! Transport trait definitions
//!
//! The capability pair every connection variant is built on: a shareable
//! write half and an owned, event-yielding read half. Implementations move
//! raw bytes only; message boundaries are the framing layer's concern.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Events surfaced by a transport receiver
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Raw bytes from one read or one datagram
    Data(Bytes),
    /// Transport closed (clean end-of-stream or explicit close)
    Disconnected { reason: Option<String> },
    /// Fatal I/O error; no further data follows
    Error(String),
}

/// Write half of a transport, shareable across tasks
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Write one chunk; atomic per call at the transport level
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Whether the transport is still usable
    fn is_open(&self) -> bool;

    /// Close the transport; the paired receive loop exits promptly.
    /// Idempotent — closing an already-closed transport is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Read half of a transport, owned by exactly one receive loop
#[async_trait]
pub trait TransportReceiver: Send {
    /// Next event; `None` once the transport is torn down
    async fn recv(&mut self) -> Option<TransportEvent>;
}
