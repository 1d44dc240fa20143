//! Exchange Latency Probe
//!
//! Measures latency to exchange endpoints four ways: TCP connect time, REST
//! ping round trips, WebSocket ping/pong round trips and the age of stream
//! events on arrival. Each probe yields the same percentile summary so the
//! layers can be compared side by side.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod dns;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod output;
pub mod persistence;
pub mod probe;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use executor::ProbeOrchestrator;
pub use models::{ComparisonReport, Config, ProbeResult, SweepReport};
pub use output::{ColoredFormatter, OutputFormatter, OutputFormatterFactory, PlainFormatter};
pub use stats::{LatencyStatistics, StatisticsAccumulator};
pub use types::{LatencyLevel, ProbeKind};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_HOST: &str = "stream.binance.com";

    // TCP connect probe
    pub const DEFAULT_TCP_SAMPLES: u32 = 20;
    pub const DEFAULT_TCP_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const TCP_WARMUP_COUNT: usize = 10;
    pub const TCP_WARMUP_INTERVAL: Duration = Duration::from_millis(50);
    pub const TCP_PROGRESS_EVERY: usize = 10;

    // WebSocket ping/pong probe
    pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/ws";
    pub const DEFAULT_PING_SAMPLES: u32 = 100;
    /// Exchange limit is 5 control frames per second
    pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(200);
    pub const PING_WARMUP_COUNT: usize = 5;
    pub const PING_WARMUP_INTERVAL: Duration = Duration::from_millis(250);
    pub const PONG_DRAIN_GRACE: Duration = Duration::from_secs(1);
    pub const PING_PROGRESS_EVERY: usize = 50;

    // Stream event probe
    pub const DEFAULT_TOPIC: &str = "btcusdt@trade";
    pub const DEFAULT_STREAM_DURATION: Duration = Duration::from_secs(60);
    pub const DEFAULT_STREAM_WARMUP: Duration = Duration::from_secs(5);
    pub const STREAM_PROGRESS_EVERY: usize = 500;

    pub const WS_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
    pub const WS_OPEN_POLL: Duration = Duration::from_millis(100);

    // REST ping probe
    pub const DEFAULT_HTTP_PING_URL: &str = "https://api.binance.com/api/v3/ping";
    pub const DEFAULT_HTTP_SAMPLES: u32 = 20;

    /// Named endpoints for the sweep
    pub const DEFAULT_ENDPOINTS: &[(&str, &str)] = &[
        ("spot_api", "api.binance.com"),
        ("futures_api", "fapi.binance.com"),
        ("coin_futures", "dapi.binance.com"),
        ("spot_ws", "stream.binance.com"),
        ("futures_ws", "fstream.binance.com"),
    ];

    /// REST ping paths by host; other hosts are pinged at their root
    pub const ENDPOINT_PING_PATHS: &[(&str, &str)] = &[
        ("api.binance.com", "/api/v3/ping"),
        ("fapi.binance.com", "/fapi/v1/ping"),
        ("dapi.binance.com", "/dapi/v1/ping"),
    ];

    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
