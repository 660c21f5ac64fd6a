//! Stream server
//!
//! One accept loop; every accepted socket becomes a framed peer with its own
//! receive loop. The registry is a concurrent map because the accept task
//! inserts while application tasks read it through `send_to`/`broadcast`.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tether_core::{id_for_addr, Packet, PeerId};
use tether_transport::{FramedPeer, PacketCallback, TcpAcceptor, TcpConfig};

use crate::error::{Result, ServerError};
use crate::JoinCallback;

/// Builder for a [`StreamServer`].
pub struct StreamServerBuilder {
    config: TcpConfig,
    on_join: Option<JoinCallback>,
    on_packet: Option<PacketCallback>,
}

impl StreamServerBuilder {
    pub fn new() -> Self {
        Self {
            config: TcpConfig::default(),
            on_join: None,
            on_packet: None,
        }
    }

    /// Override the stream transport configuration.
    pub fn config(mut self, config: TcpConfig) -> Self {
        self.config = config;
        self
    }

    /// Hook invoked with the new peer's identifier on every accept.
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

    /// Bind the accepting socket and launch the accept loop.
    ///
    /// Returns once the loop task is running; a bind failure surfaces here.
    pub async fn bind(self, addr: &str) -> Result<StreamServer> {
        let acceptor = TcpAcceptor::bind_with_config(addr, self.config).await?;
        let local_addr = acceptor.local_addr()?;

        let peers: Arc<DashMap<PeerId, Arc<FramedPeer>>> = Arc::new(DashMap::new());
        let running = Arc::new(RwLock::new(true));

        let on_packet = self.on_packet.unwrap_or_else(|| {
            Arc::new(|packet: Packet| {
                debug!(sender = %packet.sender, "packet dropped: no callback registered");
            })
        });

        let accept_task = tokio::spawn(run_accept_loop(
            acceptor,
            Arc::clone(&peers),
            Arc::clone(&running),
            on_packet,
            self.on_join,
        ));

        info!(%local_addr, "stream server running");
        Ok(StreamServer {
            local_addr,
            peers,
            running,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }
}

impl Default for StreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_accept_loop(
    acceptor: TcpAcceptor,
    peers: Arc<DashMap<PeerId, Arc<FramedPeer>>>,
    running: Arc<RwLock<bool>>,
    on_packet: PacketCallback,
    on_join: Option<JoinCallback>,
) {
    while *running.read() {
        match acceptor.accept().await {
            Ok((sender, receiver, peer_addr)) => {
                let id = id_for_addr(&peer_addr);
                info!(%peer_addr, peer = %id, "peer connected");

                let peer =
                    FramedPeer::spawn(id.clone(), Arc::new(sender), receiver, on_packet.clone());

                // same source address (or a digest collision) maps to the
                // same identifier; the newest connection wins the slot
                if let Some(displaced) = peers.insert(id.clone(), peer) {
                    warn!(peer = %id, "identifier already registered, closing displaced connection");
                    displaced.close().await;
                }

                if let Some(on_join) = &on_join {
                    on_join(id);
                }
            }
            Err(e) => {
                if !*running.read() {
                    break;
                }
                // one failed accept never takes the server down
                error!("accept failed: {}", e);
            }
        }
    }

    debug!("accept loop ended");
}

/// A running stream server.
///
/// Registry entries are inserted by the accept loop and removed only by
/// [`close`](StreamServer::close) (or displacement by a colliding accept) —
/// a peer whose own receive loop has exited stays registered as a Closed
/// connection, and sends to it are dropped silently.
pub struct StreamServer {
    local_addr: SocketAddr,
    peers: Arc<DashMap<PeerId, Arc<FramedPeer>>>,
    running: Arc<RwLock<bool>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamServer {
    pub fn builder() -> StreamServerBuilder {
        StreamServerBuilder::new()
    }

    /// Send one message to the peer registered under `id`.
    pub async fn send_to(&self, id: &str, message: &str) -> Result<()> {
        if !self.is_running() {
            return Err(ServerError::Closed);
        }
        let peer = self
            .peers
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ServerError::UnknownPeer(id.to_string()))?;
        peer.send(message).await.map_err(Into::into)
    }

    /// Send one message to every registered peer. Individual failures are
    /// logged and do not abort the rest.
    pub async fn broadcast(&self, message: &str) -> Result<()> {
        if !self.is_running() {
            return Err(ServerError::Closed);
        }
        let peers: Vec<_> = self
            .peers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for peer in peers {
            if let Err(e) = peer.send(message).await {
                warn!(peer = %peer.id(), "broadcast send failed: {}", e);
            }
        }
        Ok(())
    }

    /// Probe one peer; its reply updates [`rtt`](StreamServer::rtt).
    pub async fn ping(&self, id: &str) -> Result<()> {
        if !self.is_running() {
            return Err(ServerError::Closed);
        }
        let peer = self
            .peers
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ServerError::UnknownPeer(id.to_string()))?;
        peer.ping().await.map_err(Into::into)
    }

    /// Last measured round trip to `id`, if any probe has completed.
    pub fn rtt(&self, id: &str) -> Option<Duration> {
        self.peers.get(id).and_then(|entry| entry.value().rtt())
    }

    /// Identifiers currently registered.
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

    /// Stop accepting, close every registered connection, clear the
    /// registry. Idempotent.
    pub async fn close(&self) {
        {
            let mut running = self.running.write();
            if !*running {
                return;
            }
            *running = false;
        }

        // aborting the accept task drops the listener, closing the
        // accepting socket
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }

        let peers: Vec<_> = self
            .peers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.peers.clear();
        for peer in peers {
            peer.close().await;
        }

        info!("stream server closed");
    }
}

impl std::fmt::Debug for StreamServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamServer")
            .field("local_addr", &self.local_addr)
            .field("peers", &self.peer_count())
            .field("running", &self.is_running())
            .finish()
    }
}
