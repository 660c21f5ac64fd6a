//! Server error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Addressed send to an identifier not present in the registry.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// Operation on a server that has been closed.
    #[error("server closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] tether_transport::TransportError),
}
