//! Tether Transport Layer
//!
//! Byte movers and the framed-peer driver that rides them:
//! - TCP (reliable, ordered stream; one I/O task per connection)
//! - UDP (best-effort datagrams in fixed 1024-byte envelopes)
//!
//! Transports expose a read/write capability pair ([`TransportSender`],
//! [`TransportReceiver`]); everything protocol-shaped — framing, control
//! interception, latency bookkeeping, delivery — is written once in
//! [`FramedPeer`] and shared by every connection variant.

pub mod error;
pub mod framed;
pub mod tcp;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use framed::{FramedPeer, PacketCallback};
pub use tcp::{TcpAcceptor, TcpConfig, TcpConnector, TcpReceiver, TcpSender};
pub use traits::{TransportEvent, TransportReceiver, TransportSender};
pub use udp::{UdpEndpoint, UdpReceiver, UdpSender};
