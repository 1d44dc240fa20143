//! Data models and structures for the exchange latency probe

pub mod config;
pub mod metrics;

// Re-export main model types
pub use config::Config;
pub use metrics::{
    ComparisonEntry, ComparisonReport, InstanceMetadata, ProbeFailure, ProbeResult, SweepEntry, SweepReport,
};
