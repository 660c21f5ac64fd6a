//! Peer identifier derivation

use sha2::{Digest, Sha256};
use std::net::SocketAddr;

/// Opaque peer identifier.
///
/// Server-side this is the address digest from [`id_for_addr`]; an outbound
/// connection instead carries an application-chosen label for its remote end.
pub type PeerId = String;

/// Conventional label an outbound connection uses for the server it dialed.
pub const SERVER_LABEL: &str = "server";

/// Derive the stable identifier for a remote socket address.
///
/// Only the IP address goes into the digest — the ephemeral port is excluded
/// so a reconnect from the same host maps to the same identifier. Distinct
/// addresses get distinct identifiers up to digest collision, which the
/// registry reports rather than resolves.
pub fn id_for_addr(addr: &SocketAddr) -> PeerId {
    id_for_host(&addr.ip().to_string())
}

/// Derive the stable identifier for a host string.
pub fn id_for_host(host: &str) -> PeerId {
    let mut sha256 = Sha256::default();
    sha256.update(host.as_bytes());
    let digest = sha256.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
