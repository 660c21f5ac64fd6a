//! Outbound connection handle

use std::sync::Arc;
use std::time::Duration;

use tether_transport::FramedPeer;

use crate::builder::ConnectionBuilder;
use crate::error::Result;

/// One live point-to-point connection, stream or datagram.
///
/// The receive loop runs on its own task from the moment the builder
/// returns; packets flow to the registered callback tagged with this
/// connection's label. Dropping the handle does not close the connection —
/// call [`close`](Connection::close).
pub struct Connection {
    pub(crate) peer: Arc<FramedPeer>,
}

impl Connection {
    /// Start building a connection to `addr` (`"host:port"`).
    pub fn builder(addr: &str) -> ConnectionBuilder {
        ConnectionBuilder::new(addr)
    }

    /// Send one message. Silently dropped once the connection is Closed;
    /// a transport write failure on an open connection is returned.
    pub async fn send(&self, message: &str) -> Result<()> {
        self.peer.send(message).await.map_err(Into::into)
    }

    /// Send a liveness probe; the answering pong updates [`rtt`](Connection::rtt).
    pub async fn ping(&self) -> Result<()> {
        self.peer.ping().await.map_err(Into::into)
    }

    /// Last measured round trip, `None` until a probe has completed.
    pub fn rtt(&self) -> Option<Duration> {
        self.peer.rtt()
    }

    /// Whether the connection is still Open.
    pub fn is_open(&self) -> bool {
        self.peer.is_open()
    }

    /// The label inbound packets on this connection carry as their sender.
    pub fn label(&self) -> &str {
        self.peer.id()
    }

    /// Close the connection. Idempotent; the receive loop exits promptly.
    pub async fn close(&self) {
        self.peer.close().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("label", &self.label())
            .field("open", &self.is_open())
            .finish()
    }
}
