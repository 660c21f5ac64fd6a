//! Tether servers
//!
//! Two listener variants behind one callback surface:
//! - [`StreamServer`] accepts stream connections and gives each its own
//!   framed receive loop; the registry maps peer identifiers to live
//!   connections.
//! - [`DatagramServer`] owns a single datagram socket and demultiplexes
//!   peers by source address; the registry maps peer identifiers to
//!   addresses.
//!
//! Peer identifiers are address digests (see `tether_core::peer`), used
//! both for the join hook and as the sender tag on delivered packets.

pub mod datagram;
pub mod error;
pub mod stream;

use std::sync::Arc;

use tether_core::PeerId;

pub use datagram::{DatagramServer, DatagramServerBuilder};
pub use error::{Result, ServerError};
pub use stream::{StreamServer, StreamServerBuilder};

pub use tether_core::Packet;
pub use tether_transport::PacketCallback;

/// Hook invoked the first time a peer is observed (stream accept or first
/// datagram). Runs on the server's accept/receive task.
pub type JoinCallback = Arc<dyn Fn(PeerId) + Send + Sync>;
