//! Tether client library
//!
//! Outbound point-to-point connections with one callback surface across
//! both transports:
//!
//! ```no_run
//! use tether_client::Connection;
//!
//! # async fn run() -> tether_client::Result<()> {
//! let conn = Connection::builder("127.0.0.1:7400")
//!     .on_packet(|packet| println!("<{}> {}", packet.sender, packet.payload))
//!     .connect_stream()
//!     .await?;
//!
//! conn.send("hello").await?;
//! conn.ping().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod connection;
pub mod error;

pub use builder::ConnectionBuilder;
pub use connection::Connection;
pub use error::{ClientError, Result};

pub use tether_core::{Packet, PeerId};
