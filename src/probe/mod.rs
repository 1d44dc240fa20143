//! Latency probes
//!
//! Each probe is built from an explicit configuration, run exactly once via
//! `run(self, ..)`, and yields a [`ProbeResult`](crate::models::ProbeResult).
//! Probes:
//! - `tcp`: time to establish a TCP connection
//! - `http`: REST ping round trip over a pooled client
//! - `ping_pong`: WebSocket protocol pings correlated FIFO with pongs
//! - `stream_event`: receive time minus producer event time on a stream
//!
//! `websocket` is the shared transport for the two WebSocket probes.

pub mod http;
pub mod ping_pong;
pub mod stream_event;
pub mod tcp;
pub mod websocket;

pub use http::{HttpPingConfig, HttpPingProbe};
pub use ping_pong::{PingPongConfig, PingPongProbe, PingTracker, PongOutcome};
pub use stream_event::{EventSampler, StreamEventConfig, StreamEventProbe};
pub use tcp::{TcpConnectProbe, TcpConnector, TcpProbeConfig, TokioConnector};
pub use websocket::{ConnectOptions, WsClient, WsEventHandler};

use crate::types::ProbeKind;

/// Stage of a probe run, reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    Connecting,
    Warmup,
    Measuring,
    Draining,
    Finished,
}

impl ProbePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbePhase::Connecting => "connecting",
            ProbePhase::Warmup => "warming up",
            ProbePhase::Measuring => "measuring",
            ProbePhase::Draining => "draining",
            ProbePhase::Finished => "finished",
        }
    }
}

/// Receives progress from running probes.
///
/// Called from the transport task as well as the pacing loop, so
/// implementations must be cheap and must not block.
pub trait ProgressObserver: Send + Sync {
    /// Phase transitions
    fn on_phase(&self, _kind: ProbeKind, _phase: ProbePhase) {}

    /// `collected` samples so far, out of `target` when the probe is count-bound
    fn on_progress(&self, kind: ProbeKind, collected: usize, target: Option<usize>);

    /// Anomalies worth surfacing to the user while the probe runs
    fn on_warning(&self, kind: ProbeKind, message: &str);
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _kind: ProbeKind, _collected: usize, _target: Option<usize>) {}

    fn on_warning(&self, _kind: ProbeKind, _message: &str) {}
}

/// Observer that records warnings and progress, for tests
#[derive(Debug, Default)]
pub struct RecordingObserver {
    warnings: parking_lot::Mutex<Vec<(ProbeKind, String)>>,
    progress: parking_lot::Mutex<Vec<(ProbeKind, usize)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<(ProbeKind, String)> {
        self.warnings.lock().clone()
    }

    pub fn progress(&self) -> Vec<(ProbeKind, usize)> {
        self.progress.lock().clone()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&self, kind: ProbeKind, collected: usize, _target: Option<usize>) {
        self.progress.lock().push((kind, collected));
    }

    fn on_warning(&self, kind: ProbeKind, message: &str) {
        self.warnings.lock().push((kind, message.to_string()));
    }
}
