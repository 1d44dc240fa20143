//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// The measurement method a probe uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Raw TCP connection establishment
    TcpConnect,
    /// REST ping round trip through a pooled HTTP client
    HttpPing,
    /// Protocol-level WebSocket ping/pong
    WsPingPong,
    /// Receive time minus producer event time on a subscribed stream
    StreamEvent,
}

impl ProbeKind {
    /// Display label used in reports and comparison tables
    pub fn label(&self) -> &'static str {
        match self {
            ProbeKind::TcpConnect => "TCP connect",
            ProbeKind::HttpPing => "HTTP ping",
            ProbeKind::WsPingPong => "WebSocket ping/pong",
            ProbeKind::StreamEvent => "Stream event",
        }
    }

    /// Short identifier used in file names and log fields
    pub fn slug(&self) -> &'static str {
        match self {
            ProbeKind::TcpConnect => "tcp",
            ProbeKind::HttpPing => "http_ping",
            ProbeKind::WsPingPong => "ws_ping",
            ProbeKind::StreamEvent => "stream_event",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Latency classification used for console coloring
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyLevel {
    /// Same region or colocated (< 20 ms)
    Good,
    /// Cross-region (20-100 ms)
    Moderate,
    /// Intercontinental or congested (> 100 ms)
    Poor,
}

impl LatencyLevel {
    /// Classify a latency value in milliseconds
    pub fn from_millis(ms: f64) -> Self {
        if ms < 20.0 {
            Self::Good
        } else if ms < 100.0 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_kind_labels() {
        assert_eq!(ProbeKind::TcpConnect.to_string(), "TCP connect");
        assert_eq!(ProbeKind::WsPingPong.slug(), "ws_ping");
        assert_eq!(serde_json::to_string(&ProbeKind::StreamEvent).unwrap(), "\"stream_event\"");
    }

    #[test]
    fn test_latency_level() {
        assert_eq!(LatencyLevel::from_millis(3.2), LatencyLevel::Good);
        assert_eq!(LatencyLevel::from_millis(20.0), LatencyLevel::Moderate);
        assert_eq!(LatencyLevel::from_millis(180.0), LatencyLevel::Poor);
    }
}
