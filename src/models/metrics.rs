//! Probe results and report data models

use crate::error::Result;
use crate::stats::{LatencyStatistics, StatisticsAccumulator};
use crate::types::{LatencyLevel, ProbeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Outcome of a single probe run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Measurement method
    pub kind: ProbeKind,

    /// Host, address or URL that was measured
    pub target: String,

    /// Summary over the measured samples
    pub statistics: LatencyStatistics,

    /// Measured samples in arrival order
    pub samples: Vec<f64>,

    /// Measurement attempts, excluding warmup
    pub attempted: usize,

    /// Skipped connects or pings that never received a pong
    pub lost: usize,

    /// Pongs that arrived with nothing outstanding
    pub stray_pongs: usize,

    /// Malformed stream messages that were dropped
    pub malformed_messages: usize,

    /// Whether large negative latencies hinted at clock skew
    pub clock_skew_warning: bool,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ProbeResult {
    /// Build a result from the post-warmup accumulator.
    ///
    /// Fails when the accumulator holds too few samples for statistics.
    pub fn from_accumulator(
        kind: ProbeKind,
        target: impl Into<String>,
        accumulator: StatisticsAccumulator,
        started_at: DateTime<Utc>,
    ) -> Result<Self> {
        let statistics = accumulator.compute()?;
        let samples = accumulator.into_samples();
        Ok(Self {
            kind,
            target: target.into(),
            attempted: samples.len(),
            statistics,
            samples,
            lost: 0,
            stray_pongs: 0,
            malformed_messages: 0,
            clock_skew_warning: false,
            started_at,
            completed_at: Utc::now(),
        })
    }

    pub fn with_attempted(mut self, attempted: usize) -> Self {
        self.attempted = attempted;
        self
    }

    pub fn with_lost(mut self, lost: usize) -> Self {
        self.lost = lost;
        self
    }

    pub fn with_stray_pongs(mut self, stray_pongs: usize) -> Self {
        self.stray_pongs = stray_pongs;
        self
    }

    pub fn with_malformed_messages(mut self, malformed: usize) -> Self {
        self.malformed_messages = malformed;
        self
    }

    pub fn with_clock_skew_warning(mut self, warned: bool) -> Self {
        self.clock_skew_warning = warned;
        self
    }

    /// Lost share of attempts, in percent
    pub fn loss_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.lost as f64 / self.attempted as f64 * 100.0
    }

    /// Wall-clock time the run took
    pub fn elapsed(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }

    /// Classification of the tail latency
    pub fn latency_level(&self) -> LatencyLevel {
        LatencyLevel::from_millis(self.statistics.p99)
    }
}

/// One row of the p99 comparison table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub kind: ProbeKind,
    pub target: String,
    pub count: usize,
    pub mean: f64,
    pub p50: f64,
    pub p99: f64,
    pub lost: usize,
}

impl From<&ProbeResult> for ComparisonEntry {
    fn from(result: &ProbeResult) -> Self {
        Self {
            kind: result.kind,
            target: result.target.clone(),
            count: result.statistics.count,
            mean: result.statistics.mean,
            p50: result.statistics.p50,
            p99: result.statistics.p99,
            lost: result.lost,
        }
    }
}

/// A probe that did not produce a result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: ProbeKind,
    pub target: String,
    pub category: String,
    pub message: String,
}

/// Results of one comparison run against a single host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub host: String,
    pub results: Vec<ProbeResult>,
    pub failures: Vec<ProbeFailure>,
}

impl ComparisonReport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Comparison rows sorted by p99, fastest first
    pub fn ranked(&self) -> Vec<ComparisonEntry> {
        let mut entries: Vec<ComparisonEntry> = self.results.iter().map(ComparisonEntry::from).collect();
        entries.sort_by(|a, b| a.p99.total_cmp(&b.p99));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Per-endpoint record of the endpoint sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEntry {
    /// Endpoint name from the endpoint table
    pub name: String,
    pub host: String,
    /// Addresses returned by DNS
    pub addresses: Vec<IpAddr>,
    pub tcp: Option<LatencyStatistics>,
    pub http: Option<LatencyStatistics>,
    /// Raw traceroute / MTR output when path analysis ran
    pub path_report: Option<String>,
    /// Errors encountered for this endpoint
    pub errors: Vec<String>,
}

impl SweepEntry {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            addresses: Vec::new(),
            tcp: None,
            http: None,
            path_report: None,
            errors: Vec::new(),
        }
    }
}

/// EC2 instance identity gathered before a sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub instance_id: Option<String>,
    pub instance_type: Option<String>,
    pub availability_zone: Option<String>,
    pub local_ipv4: Option<String>,
    pub public_ipv4: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
}

/// Results of an endpoint sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub timestamp: DateTime<Utc>,
    pub instance: Option<InstanceMetadata>,
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            instance: None,
            entries: Vec::new(),
        }
    }

    /// Endpoints with a TCP measurement, sorted by average connect latency
    pub fn tcp_ranking(&self) -> Vec<(&str, f64)> {
        let mut ranking: Vec<(&str, f64)> = self
            .entries
            .iter()
            .filter_map(|e| e.tcp.as_ref().map(|s| (e.name.as_str(), s.mean)))
            .collect();
        ranking.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranking
    }
}

impl Default for SweepReport {
    fn default() -> Self {
        Self::new()
    }
}
