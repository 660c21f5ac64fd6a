//! Per-peer round-trip latency tracking

use std::time::{Duration, Instant};

/// Tracks one outstanding liveness probe and the last measured round trip.
///
/// There is no probing schedule here — callers decide when to probe. A reply
/// that arrives with no probe ever recorded is ignored; a late reply to an
/// old probe overwrites the measurement with whatever has elapsed since that
/// probe, which is the accepted cost of not tagging probes with sequence
/// numbers.
#[derive(Debug, Clone, Default)]
pub struct PingMonitor {
    probe_sent_at: Option<Instant>,
    rtt: Option<Duration>,
}

impl PingMonitor {
    /// Create a monitor with no probe outstanding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a probe just went out on the wire.
    pub fn probe_sent(&mut self) {
        self.probe_sent_at = Some(Instant::now());
    }

    /// Record a probe reply, updating the measured round trip.
    pub fn pong_received(&mut self) {
        if let Some(sent) = self.probe_sent_at {
            self.rtt = Some(sent.elapsed());
        }
    }

    /// Last measured round trip, `None` until a probe has completed.
    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }
}
