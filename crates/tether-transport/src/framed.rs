//! Transport-agnostic framed peer
//!
//! One receive-loop implementation shared by the stream client, the datagram
//! client, and every connection a stream server accepts. The transport
//! supplies the capability pair; this driver owns framing, control-message
//! interception, latency bookkeeping, and delivery to the listener.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use tether_core::framing::{self, Control};
use tether_core::{Packet, PeerId, PingMonitor, PING, PONG};

use crate::error::Result;
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Callback invoked with every application packet extracted from the wire.
///
/// Runs on the peer's receive task. A listener that touches shared state
/// synchronizes that state itself; delivery order is transport order within
/// one peer and unordered across peers.
pub type PacketCallback = Arc<dyn Fn(Packet) + Send + Sync>;

/// A transport endpoint plus the protocol state riding on it.
///
/// Lifecycle is Open from spawn until either an explicit [`close`] or the
/// receive loop exiting on end-of-stream / fatal I/O error; the two paths
/// converge on the same closed transport, so a later explicit close is a
/// no-op.
///
/// [`close`]: FramedPeer::close
pub struct FramedPeer {
    id: PeerId,
    sender: Arc<dyn TransportSender>,
    ping: Mutex<PingMonitor>,
}

impl FramedPeer {
    /// Launch the receive loop over `receiver` and return the peer handle.
    ///
    /// Returns as soon as the loop task is spawned, not once any data has
    /// been exchanged.
    pub fn spawn(
        id: PeerId,
        sender: Arc<dyn TransportSender>,
        receiver: impl TransportReceiver + 'static,
        on_packet: PacketCallback,
    ) -> Arc<Self> {
        let peer = Arc::new(Self {
            id,
            sender,
            ping: Mutex::new(PingMonitor::new()),
        });

        tokio::spawn(run_peer_loop(peer.clone(), receiver, on_packet));
        peer
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Whether the connection is still Open.
    pub fn is_open(&self) -> bool {
        self.sender.is_open()
    }

    /// Send one application message (marker appended on the wire).
    ///
    /// A send on a closed connection is dropped silently — the receive loop
    /// may close the connection at any moment and callers cannot usefully
    /// race it. A transport write failure on an open connection propagates.
    pub async fn send(&self, payload: &str) -> Result<()> {
        if !self.is_open() {
            debug!(peer = %self.id, "send on closed connection dropped");
            return Ok(());
        }
        self.sender.send(framing::encode(payload)).await
    }

    /// Send a liveness probe and start the round-trip clock.
    pub async fn ping(&self) -> Result<()> {
        if !self.is_open() {
            debug!(peer = %self.id, "ping on closed connection dropped");
            return Ok(());
        }
        self.sender.send(framing::encode(PING)).await?;
        self.ping.lock().probe_sent();
        Ok(())
    }

    /// Last measured round trip to this peer, if a probe has completed.
    pub fn rtt(&self) -> Option<Duration> {
        self.ping.lock().rtt()
    }

    /// Close the transport. Idempotent; the receive loop exits promptly.
    pub async fn close(&self) {
        if let Err(e) = self.sender.close().await {
            debug!(peer = %self.id, "close: {}", e);
        }
    }

    /// Feed one decoded chunk through the framer, answering probes and
    /// recording replies; everything else goes to the listener.
    async fn dispatch_chunk(&self, data: &Bytes, on_packet: &PacketCallback) {
        let text = String::from_utf8_lossy(data);
        for msg in framing::split(&text) {
            match Control::classify(msg) {
                Some(Control::Ping) => {
                    trace!(peer = %self.id, "probe received, answering");
                    if let Err(e) = self.sender.send(framing::encode(PONG)).await {
                        warn!(peer = %self.id, "probe reply failed: {}", e);
                    }
                }
                Some(Control::Pong) => {
                    self.ping.lock().pong_received();
                    trace!(peer = %self.id, rtt = ?self.rtt(), "probe answered");
                }
                None => on_packet(Packet::new(self.id.clone(), msg)),
            }
        }
    }
}

impl std::fmt::Debug for FramedPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedPeer")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

async fn run_peer_loop(
    peer: Arc<FramedPeer>,
    mut receiver: impl TransportReceiver,
    on_packet: PacketCallback,
) {
    while let Some(event) = receiver.recv().await {
        match event {
            TransportEvent::Data(data) => peer.dispatch_chunk(&data, &on_packet).await,
            TransportEvent::Disconnected { reason } => {
                debug!(peer = %peer.id, ?reason, "peer disconnected");
                break;
            }
            TransportEvent::Error(e) => {
                error!(peer = %peer.id, "receive loop error: {}", e);
                break;
            }
        }
    }

    // natural exit and explicit close converge here
    peer.close().await;
    debug!(peer = %peer.id, "receive loop ended");
}
