//! TCP stream transport
//!
//! One spawned read task per connection. Each iteration takes a single
//! fixed-size read into a fresh buffer and surfaces the raw chunk as a
//! [`TransportEvent::Data`] — no length prefixes and no cross-read
//! accumulation; the marker protocol frames each chunk in isolation above
//! this layer. Writes go straight to the socket on the caller's task so
//! failures surface to the caller, serialized by a mutex so concurrent
//! sends cannot interleave mid-message.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use tether_core::ENVELOPE_SIZE;

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Depth of the inbound event channel per connection.
const EVENT_CHANNEL_SIZE: usize = 64;

/// TCP configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Bytes per read; also the ceiling on one inbound chunk
    pub read_buffer_size: usize,
    /// Disable send coalescing (Nagle), trading throughput for latency
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: ENVELOPE_SIZE,
            nodelay: true,
        }
    }
}

/// Dialer for outbound stream connections
pub struct TcpConnector {
    config: TcpConfig,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self {
            config: TcpConfig::default(),
        }
    }

    pub fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Connect to a listening peer and start the read task.
    pub async fn connect(&self, addr: &str) -> Result<(TcpSender, TcpReceiver)> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!(%addr, "tcp connected");
        Ok(spawn_stream_io(stream, &self.config))
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener for inbound stream connections
pub struct TcpAcceptor {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpAcceptor {
    /// Bind the accepting socket.
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, TcpConfig::default()).await
    }

    /// Bind with custom configuration.
    pub async fn bind_with_config(addr: &str, config: TcpConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        info!(%addr, "tcp listening");
        Ok(Self { listener, config })
    }

    /// Accept one connection and start its read task.
    pub async fn accept(&self) -> Result<(TcpSender, TcpReceiver, SocketAddr)> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;

        debug!(%peer_addr, "tcp connection accepted");
        let (sender, receiver) = spawn_stream_io(stream, &self.config);
        Ok((sender, receiver, peer_addr))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }
}

/// Split the socket, spawn the read task, hand back the capability pair.
fn spawn_stream_io(stream: TcpStream, config: &TcpConfig) -> (TcpSender, TcpReceiver) {
    if config.nodelay {
        // nodelay failing is not worth refusing the connection over
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {}", e);
        }
    }

    let (reader, writer) = stream.into_split();
    let open = Arc::new(AtomicBool::new(true));
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(run_read_loop(
        reader,
        event_tx,
        shutdown_rx,
        config.read_buffer_size,
        open.clone(),
    ));

    let sender = TcpSender {
        writer: Arc::new(Mutex::new(writer)),
        open,
        shutdown_tx,
    };
    let receiver = TcpReceiver { rx: event_rx };
    (sender, receiver)
}

async fn run_read_loop(
    mut reader: OwnedReadHalf,
    event_tx: mpsc::Sender<TransportEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
    read_buffer_size: usize,
    open: Arc<AtomicBool>,
) {
    loop {
        // fresh buffer every iteration; whatever one read brings is one chunk
        let mut buf = vec![0u8; read_buffer_size];

        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("read loop shut down locally");
                break;
            }
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    debug!("stream closed by peer");
                    let _ = event_tx
                        .send(TransportEvent::Disconnected { reason: None })
                        .await;
                    break;
                }
                Ok(n) => {
                    buf.truncate(n);
                    if event_tx.send(TransportEvent::Data(Bytes::from(buf))).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("stream read error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
}

/// Write half of a stream connection
pub struct TcpSender {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    open: Arc<AtomicBool>,
    shutdown_tx: mpsc::Sender<()>,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.try_send(());
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                debug!("shutdown on close: {}", e);
            }
        }
        Ok(())
    }
}

/// Read half of a stream connection
pub struct TcpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.read_buffer_size, ENVELOPE_SIZE);
        assert!(config.nodelay);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // port 1 is essentially never listening
        let result = TcpConnector::new().connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_raw_chunk_round_trip() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let addr = acceptor.local_addr().unwrap();

        let accept = tokio::spawn(async move { acceptor.accept().await.unwrap() });

        let (client_tx, _client_rx) = TcpConnector::new()
            .connect(&addr.to_string())
            .await
            .unwrap();
        let (_server_tx, mut server_rx, _peer) = accept.await.unwrap();

        client_tx.send(Bytes::from_static(b"hello")).await.unwrap();

        match server_rx.recv().await {
            Some(TransportEvent::Data(data)) => assert_eq!(data.as_ref(), b"hello"),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let addr = acceptor.local_addr().unwrap();

        let accept = tokio::spawn(async move { acceptor.accept().await.unwrap() });
        let (client_tx, _client_rx) = TcpConnector::new()
            .connect(&addr.to_string())
            .await
            .unwrap();
        let _conn = accept.await.unwrap();

        client_tx.close().await.unwrap();
        client_tx.close().await.unwrap();
        assert!(!client_tx.is_open());

        assert!(matches!(
            client_tx.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
    }
}
