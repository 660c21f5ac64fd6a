//! Marker-delimited message framing
//!
//! Wire format:
//! ```text
//! ┌──────────────────────────────┬───────┐
//! │ message text (UTF-8)         │ %EOP% │  × N per transport unit
//! └──────────────────────────────┴───────┘
//! ```
//!
//! Each application message is its text followed by the literal marker
//! `%EOP%`. Multiple messages may ride in one transport unit. A chunk is
//! framed in isolation: trailing text without a marker is discarded, never
//! carried over to the next read. There is no escaping — a payload that
//! itself contains the marker mis-segments.

use bytes::{BufMut, Bytes, BytesMut};

/// End-of-message marker terminating every message on the wire.
pub const MARKER: &str = "%EOP%";

/// Fixed ceiling on one stream read or one datagram payload, in bytes.
/// Content beyond it is lost rather than reassembled.
pub const ENVELOPE_SIZE: usize = 1024;

/// Reserved liveness-probe payload.
pub const PING: &str = "!ping";

/// Reserved probe-reply payload.
pub const PONG: &str = "!pong";

/// Encode one message for the wire: payload followed by the marker.
pub fn encode(payload: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + MARKER.len());
    buf.put_slice(payload.as_bytes());
    buf.put_slice(MARKER.as_bytes());
    buf.freeze()
}

/// Zero-pad or truncate `data` to the fixed datagram envelope size.
///
/// Anything past [`ENVELOPE_SIZE`] is silently dropped; the protocol has no
/// fragmentation.
pub fn fit_envelope(data: &[u8]) -> Bytes {
    let mut buf = BytesMut::zeroed(ENVELOPE_SIZE);
    let n = data.len().min(ENVELOPE_SIZE);
    buf[..n].copy_from_slice(&data[..n]);
    buf.freeze()
}

/// Split one received chunk into the complete messages it contains.
///
/// Surrounding whitespace and NUL padding are trimmed first (datagram
/// envelopes arrive zero-padded); a wholly blank chunk yields nothing.
/// An empty segment between two adjacent markers is a valid empty-payload
/// message and is yielded as such.
pub fn split(chunk: &str) -> Split<'_> {
    let trimmed = chunk.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    Split {
        rest: if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        },
    }
}

/// Iterator over the marker-terminated messages in one chunk.
pub struct Split<'a> {
    rest: Option<&'a str>,
}

impl<'a> Iterator for Split<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest?;
        match rest.find(MARKER) {
            Some(at) => {
                self.rest = Some(&rest[at + MARKER.len()..]);
                Some(&rest[..at])
            }
            None => {
                // trailing partial message, dropped
                self.rest = None;
                None
            }
        }
    }
}

/// Reserved control payloads, intercepted before delivery to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Liveness probe; the receiver answers with a pong.
    Ping,
    /// Probe reply; completes a round-trip measurement.
    Pong,
}

impl Control {
    /// Classify one message body. `None` means ordinary application payload.
    pub fn classify(payload: &str) -> Option<Self> {
        match payload {
            PING => Some(Control::Ping),
            PONG => Some(Control::Pong),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_marker() {
        assert_eq!(encode("hello").as_ref(), b"hello%EOP%");
        assert_eq!(encode("").as_ref(), b"%EOP%");
    }

    #[test]
    fn test_split_two_messages() {
        let msgs: Vec<_> = split("a%EOP%b%EOP%").collect();
        assert_eq!(msgs, vec!["a", "b"]);
    }

    #[test]
    fn test_split_discards_trailing_partial() {
        let msgs: Vec<_> = split("a%EOP%part").collect();
        assert_eq!(msgs, vec!["a"]);
    }

    #[test]
    fn test_split_blank_chunk() {
        assert_eq!(split("   \n").count(), 0);
        assert_eq!(split("\0\0\0").count(), 0);
        assert_eq!(split("").count(), 0);
    }

    #[test]
    fn test_split_trims_nul_padding() {
        let mut padded = String::from("hi%EOP%");
        padded.push_str(&"\0".repeat(100));
        let msgs: Vec<_> = split(&padded).collect();
        assert_eq!(msgs, vec!["hi"]);
    }

    #[test]
    fn test_split_empty_segment_between_markers() {
        let msgs: Vec<_> = split("a%EOP%%EOP%").collect();
        assert_eq!(msgs, vec!["a", ""]);
    }

    #[test]
    fn test_fit_envelope_pads_and_truncates() {
        let fitted = fit_envelope(b"abc");
        assert_eq!(fitted.len(), ENVELOPE_SIZE);
        assert_eq!(&fitted[..3], b"abc");
        assert!(fitted[3..].iter().all(|&b| b == 0));

        let big = vec![b'x'; ENVELOPE_SIZE + 100];
        let fitted = fit_envelope(&big);
        assert_eq!(fitted.len(), ENVELOPE_SIZE);
    }

    #[test]
    fn test_classify_control() {
        assert_eq!(Control::classify("!ping"), Some(Control::Ping));
        assert_eq!(Control::classify("!pong"), Some(Control::Pong));
        assert_eq!(Control::classify("!pingx"), None);
        assert_eq!(Control::classify("hello"), None);
    }
}
