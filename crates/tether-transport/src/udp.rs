//! UDP datagram transport
//!
//! There is no connected state: every send is one independent datagram,
//! zero-padded or truncated to the fixed 1024-byte envelope, and every
//! receive takes exactly one datagram. Each datagram is a sealed unit —
//! a marker-delimited batch inside one envelope still splits, but a message
//! can never continue across two datagrams.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use tether_core::framing;
use tether_core::ENVELOPE_SIZE;

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Depth of the inbound event channel per endpoint.
const EVENT_CHANNEL_SIZE: usize = 64;

/// A bound datagram socket.
pub struct UdpEndpoint {
    socket: Arc<UdpSocket>,
}

impl UdpEndpoint {
    /// Bind a local address. `"0.0.0.0:0"` gives an ephemeral client port.
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        let local = socket.local_addr().map_err(TransportError::Io)?;
        info!(%local, "udp bound");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    /// Send one fitted envelope to `target`.
    pub async fn send_envelope(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        self.socket
            .send_to(&framing::fit_envelope(data), target)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Block for one datagram. `buf` should hold [`ENVELOPE_SIZE`] bytes;
    /// a larger datagram is truncated by the socket, consistent with the
    /// envelope ceiling.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await.map_err(TransportError::Io)
    }

    /// Turn the endpoint into a capability pair fixed on one remote address.
    ///
    /// The receiver task takes one datagram at a time; closing the sender
    /// stops it. Datagrams from third parties are not filtered out — the
    /// socket trusts its traffic, as the protocol carries no authentication.
    pub fn into_pair(self, remote: SocketAddr) -> (UdpSender, UdpReceiver) {
        let open = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(run_recv_loop(
            self.socket.clone(),
            event_tx,
            shutdown_rx,
            open.clone(),
        ));

        let sender = UdpSender {
            socket: self.socket,
            remote,
            open,
            shutdown_tx,
        };
        let receiver = UdpReceiver { rx: event_rx };
        (sender, receiver)
    }
}

async fn run_recv_loop(
    socket: Arc<UdpSocket>,
    event_tx: mpsc::Sender<TransportEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
    open: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; ENVELOPE_SIZE];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("datagram receive loop shut down locally");
                break;
            }
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, from)) => {
                    debug!(%from, len, "datagram received");
                    let data = Bytes::copy_from_slice(&buf[..len]);
                    if event_tx.send(TransportEvent::Data(data)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("datagram receive error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
}

/// Write half: one fitted envelope per send, always to the fixed remote.
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    open: Arc<AtomicBool>,
    shutdown_tx: mpsc::Sender<()>,
}

#[async_trait]
impl TransportSender for UdpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        self.socket
            .send_to(&framing::fit_envelope(&data), self.remote)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.try_send(());
        }
        Ok(())
    }
}

/// Read half of a paired datagram endpoint.
pub struct UdpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for UdpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral() {
        let endpoint = UdpEndpoint::bind("127.0.0.1:0").await.unwrap();
        assert!(endpoint.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn test_envelope_is_fixed_size() {
        let server = UdpEndpoint::bind("127.0.0.1:0").await.unwrap();
        let client = UdpEndpoint::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        client.send_envelope(b"hi", server_addr).await.unwrap();

        let mut buf = vec![0u8; ENVELOPE_SIZE];
        let (len, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, ENVELOPE_SIZE);
        assert_eq!(&buf[..2], b"hi");
        assert!(buf[2..len].iter().all(|&b| b == 0));
        assert_eq!(from.port(), client.local_addr().unwrap().port());
    }

    #[tokio::test]
    async fn test_paired_send_recv() {
        let server = UdpEndpoint::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = UdpEndpoint::bind("127.0.0.1:0").await.unwrap();
        let (sender, _receiver) = client.into_pair(server_addr);

        sender.send(Bytes::from_static(b"ping me")).await.unwrap();

        let mut buf = vec![0u8; ENVELOPE_SIZE];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, ENVELOPE_SIZE);
        assert_eq!(&buf[..7], b"ping me");
    }

    #[tokio::test]
    async fn test_closed_sender_refuses() {
        let endpoint = UdpEndpoint::bind("127.0.0.1:0").await.unwrap();
        let remote = endpoint.local_addr().unwrap();
        let (sender, _receiver) = endpoint.into_pair(remote);

        sender.close().await.unwrap();
        sender.close().await.unwrap();
        assert!(!sender.is_open());
        assert!(matches!(
            sender.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
    }
}
