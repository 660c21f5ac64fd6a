//! Tether Core
//!
//! Pure protocol primitives shared by every tether crate:
//! - Marker-delimited message framing ([`framing`])
//! - The delivered message value ([`Packet`])
//! - Peer identifier derivation ([`peer`])
//! - Per-peer round-trip latency tracking ([`PingMonitor`])
//!
//! Nothing in this crate performs I/O or depends on a runtime; the byte
//! movers live in `tether-transport`.

pub mod framing;
pub mod packet;
pub mod peer;
pub mod ping;

pub use framing::{Control, ENVELOPE_SIZE, MARKER, PING, PONG};
pub use packet::Packet;
pub use peer::{id_for_addr, id_for_host, PeerId, SERVER_LABEL};
pub use ping::PingMonitor;
