//! Datagram server
//!
//! One socket, one receive loop, many peers. There is no per-peer channel
//! object: the loop demultiplexes by source address, and the registry maps
//! each peer's identifier to its address plus latency state. The registry
//! only grows — datagram peers never disconnect, they just go quiet.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use tether_core::framing::{self, Control};
use tether_core::{id_for_addr, Packet, PeerId, PingMonitor, ENVELOPE_SIZE, PING, PONG};
use tether_transport::{PacketCallback, UdpEndpoint};

use crate::error::{Result, ServerError};
use crate::JoinCallback;

/// One observed peer: where to reach it and how fast it answered last.
struct PeerEntry {
    addr: SocketAddr,
    ping: Mutex<PingMonitor>,
}

/// Builder for a [`DatagramServer`].
pub struct DatagramServerBuilder {
    on_join: Option<JoinCallback>,
    on_packet: Option<PacketCallback>,
}

impl DatagramServerBuilder {
    pub fn new() -> Self {
        Self {
            on_join: None,
            on_packet: None,
        }
    }

    /// Hook invoked with a peer's identifier on its first datagram.
    pub fn on_join<F>(mut self, callback: F) -> Self
    where
        F: Fn(PeerId) + Send + Sync + 'static,
    {
        self.on_join = Some(Arc::new(callback));
        self
    }

    /// Callback invoked with every application packet from any peer.
    pub fn on_packet<F>(mut self, callback: F) -> Self
    where
        F: Fn(Packet) + Send + Sync + 'static,
    {
        self.on_packet = Some(Arc::new(callback));
        self
    }

    /// Bind the socket and launch the receive loop.
    pub async fn bind(self, addr: &str) -> Result<DatagramServer> {
        let endpoint = Arc::new(UdpEndpoint::bind(addr).await?);
        let local_addr = endpoint.local_addr()?;

        let peers: Arc<DashMap<PeerId, PeerEntry>> = Arc::new(DashMap::new());
        let running = Arc::new(RwLock::new(true));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let on_packet = self.on_packet.unwrap_or_else(|| {
            Arc::new(|packet: Packet| {
                debug!(sender = %packet.sender, "packet dropped: no callback registered");
            })
        });

        tokio::spawn(run_recv_loop(
            Arc::clone(&endpoint),
            Arc::clone(&peers),
            Arc::clone(&running),
            shutdown_rx,
            on_packet,
            self.on_join,
        ));

        info!(%local_addr, "datagram server running");
        Ok(DatagramServer {
            endpoint,
            local_addr,
            peers,
            running,
            shutdown_tx,
        })
    }
}

impl Default for DatagramServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_recv_loop(
    endpoint: Arc<UdpEndpoint>,
    peers: Arc<DashMap<PeerId, PeerEntry>>,
    running: Arc<RwLock<bool>>,
    mut shutdown_rx: mpsc::Receiver<()>,
    on_packet: PacketCallback,
    on_join: Option<JoinCallback>,
) {
    let mut buf = vec![0u8; ENVELOPE_SIZE];

    while *running.read() {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("receive loop shut down");
                break;
            }
            result = endpoint.recv_from(&mut buf) => match result {
                Ok((len, from)) => {
                    handle_datagram(&endpoint, &peers, &on_packet, &on_join, &buf[..len], from)
                        .await;
                }
                Err(e) => {
                    // a bad receive from one peer must not stop serving
                    // the others
                    error!("datagram receive error: {}", e);
                }
            }
        }
    }
}

async fn handle_datagram(
    endpoint: &UdpEndpoint,
    peers: &DashMap<PeerId, PeerEntry>,
    on_packet: &PacketCallback,
    on_join: &Option<JoinCallback>,
    data: &[u8],
    from: SocketAddr,
) {
    let id = id_for_addr(&from);

    if !peers.contains_key(&id) {
        peers.insert(
            id.clone(),
            PeerEntry {
                addr: from,
                ping: Mutex::new(PingMonitor::new()),
            },
        );
        info!(%from, peer = %id, "peer observed");
        if let Some(on_join) = on_join {
            on_join(id.clone());
        }
    }

    let text = String::from_utf8_lossy(data);
    for msg in framing::split(&text) {
        match Control::classify(msg) {
            Some(Control::Ping) => {
                trace!(peer = %id, "probe received, answering");
                if let Err(e) = endpoint.send_envelope(&framing::encode(PONG), from).await {
                    warn!(peer = %id, "probe reply failed: {}", e);
                }
            }
            Some(Control::Pong) => {
                if let Some(entry) = peers.get(&id) {
                    entry.ping.lock().pong_received();
                    trace!(peer = %id, "probe answered");
                }
            }
            None => on_packet(Packet::new(id.clone(), msg)),
        }
    }
}

/// A running datagram server.
pub struct DatagramServer {
    endpoint: Arc<UdpEndpoint>,
    local_addr: SocketAddr,
    peers: Arc<DashMap<PeerId, PeerEntry>>,
    running: Arc<RwLock<bool>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl DatagramServer {
    pub fn builder() -> DatagramServerBuilder {
        DatagramServerBuilder::new()
    }

    /// Send one fitted envelope to the peer registered under `id`.
    pub async fn send_to(&self, id: &str, message: &str) -> Result<()> {
        if !self.is_running() {
            return Err(ServerError::Closed);
        }
        let addr = self
            .peers
            .get(id)
            .map(|entry| entry.value().addr)
            .ok_or_else(|| ServerError::UnknownPeer(id.to_string()))?;

        self.endpoint
            .send_envelope(&framing::encode(message), addr)
            .await
            .map_err(Into::into)
    }

    /// Send one envelope per known peer. Individual failures are logged and
    /// do not abort the rest.
    pub async fn broadcast(&self, message: &str) -> Result<()> {
        if !self.is_running() {
            return Err(ServerError::Closed);
        }
        let targets: Vec<(PeerId, SocketAddr)> = self
            .peers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().addr))
            .collect();

        let data = framing::encode(message);
        for (id, addr) in targets {
            if let Err(e) = self.endpoint.send_envelope(&data, addr).await {
                warn!(peer = %id, "broadcast send failed: {}", e);
            }
        }
        Ok(())
    }

    /// Probe one peer; its reply updates [`rtt`](DatagramServer::rtt).
    pub async fn ping(&self, id: &str) -> Result<()> {
        if !self.is_running() {
            return Err(ServerError::Closed);
        }
        let addr = self
            .peers
            .get(id)
            .map(|entry| entry.value().addr)
            .ok_or_else(|| ServerError::UnknownPeer(id.to_string()))?;

        self.endpoint
            .send_envelope(&framing::encode(PING), addr)
            .await?;

        if let Some(entry) = self.peers.get(id) {
            entry.value().ping.lock().probe_sent();
        }
        Ok(())
    }

    /// Last measured round trip to `id`, if any probe has completed.
    pub fn rtt(&self, id: &str) -> Option<Duration> {
        self.peers.get(id).and_then(|entry| entry.value().ping.lock().rtt())
    }

    /// Identifiers observed so far.
    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Stop the receive loop. Idempotent. The peer registry is left as-is;
    /// addressed sends now fail with [`ServerError::Closed`].
    pub async fn close(&self) {
        {
            let mut running = self.running.write();
            if !*running {
                return;
            }
            *running = false;
        }
        let _ = self.shutdown_tx.try_send(());
        info!("datagram server closed");
    }
}

impl std::fmt::Debug for DatagramServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramServer")
            .field("local_addr", &self.local_addr)
            .field("peers", &self.peer_count())
            .field("running", &self.is_running())
            .finish()
    }
}
