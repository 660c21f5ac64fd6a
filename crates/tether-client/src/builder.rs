//! Connection builder

use std::net::SocketAddr;
use std::sync::Arc;

use tether_core::{Packet, SERVER_LABEL};
use tether_transport::{FramedPeer, PacketCallback, TcpConnector, UdpEndpoint};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{ClientError, Result};

/// Builder for an outbound [`Connection`].
pub struct ConnectionBuilder {
    addr: String,
    label: String,
    on_packet: Option<PacketCallback>,
}

impl ConnectionBuilder {
    /// Create a builder targeting `addr` (`"host:port"`).
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            label: SERVER_LABEL.to_string(),
            on_packet: None,
        }
    }

    /// Set the sender label inbound packets carry (default `"server"`).
    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Register the packet callback. Without one, inbound messages are
    /// dropped with a debug log.
    pub fn on_packet<F>(mut self, callback: F) -> Self
    where
        F: Fn(Packet) + Send + Sync + 'static,
    {
        self.on_packet = Some(Arc::new(callback));
        self
    }

    /// Dial over the reliable, ordered stream transport.
    pub async fn connect_stream(self) -> Result<Connection> {
        let (sender, receiver) = TcpConnector::new().connect(&self.addr).await?;
        let peer = FramedPeer::spawn(
            self.label,
            Arc::new(sender),
            receiver,
            callback_or_sink(self.on_packet),
        );
        Ok(Connection { peer })
    }

    /// Dial over the best-effort datagram transport. No handshake happens;
    /// the connection is "up" as soon as the local socket is bound.
    pub async fn connect_datagram(self) -> Result<Connection> {
        let remote = resolve(&self.addr).await?;
        let local = if remote.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };

        let endpoint = UdpEndpoint::bind(local).await?;
        let (sender, receiver) = endpoint.into_pair(remote);
        let peer = FramedPeer::spawn(
            self.label,
            Arc::new(sender),
            receiver,
            callback_or_sink(self.on_packet),
        );
        Ok(Connection { peer })
    }
}

fn callback_or_sink(callback: Option<PacketCallback>) -> PacketCallback {
    callback.unwrap_or_else(|| {
        Arc::new(|packet: Packet| {
            debug!(sender = %packet.sender, "packet dropped: no callback registered");
        })
    })
}

async fn resolve(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .map_err(|e| ClientError::InvalidAddress(format!("{addr}: {e}")))?
        .next()
        .ok_or_else(|| ClientError::InvalidAddress(addr.to_string()))
}
