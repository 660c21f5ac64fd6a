//! The unit of delivery

use crate::peer::PeerId;

/// One application message as handed to the listener callback.
///
/// Created when the framer detects a message boundary; never mutated after
/// that. The sender tag is the registry identifier server-side, or the
/// connection's label client-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Identifier of the peer the payload came from.
    pub sender: PeerId,
    /// Message text, marker stripped.
    pub payload: String,
}

impl Packet {
    /// Create a new packet.
    pub fn new(sender: impl Into<PeerId>, payload: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            payload: payload.into(),
        }
    }
}
