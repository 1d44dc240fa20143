//! Configuration data model and validation

use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host probed by the TCP connect probe
    #[serde(default = "default_host")]
    pub host: String,

    /// Explicit TCP port; falls back to 443, or 80 when SSL is disabled
    #[serde(default)]
    pub port: Option<u16>,

    /// Number of measured TCP connects
    #[serde(default = "default_tcp_samples")]
    pub tcp_samples: u32,

    /// Sleep between TCP connects
    #[serde(default = "default_tcp_interval_ms")]
    pub tcp_interval_ms: u64,

    /// Per-connect socket timeout
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Bare WebSocket endpoint used for ping/pong
    #[serde(default = "default_ping_url")]
    pub ping_url: String,

    /// Number of ping/pong samples to collect
    #[serde(default = "default_ping_samples")]
    pub ping_samples: u32,

    /// Requested ping cadence; clamped to the exchange rate limit at run time
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// WebSocket endpoint for the stream event probe
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Stream topic to subscribe to
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Measurement window of the stream event probe
    #[serde(default = "default_stream_duration_secs")]
    pub stream_duration_secs: u64,

    /// Warmup window of the stream event probe
    #[serde(default = "default_stream_warmup_secs")]
    pub stream_warmup_secs: u64,

    /// REST ping URL; the HTTP probe only runs when set
    #[serde(default = "default_http_ping_url")]
    pub http_ping_url: Option<String>,

    /// Number of HTTP ping samples
    #[serde(default = "default_http_samples")]
    pub http_samples: u32,

    /// Named endpoint table used by the sweep
    #[serde(default = "default_endpoints")]
    pub endpoints: BTreeMap<String, String>,

    /// Use plain schemes and port 80
    #[serde(default)]
    pub disable_ssl: bool,

    /// Directory for JSON result records
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub run_tcp: bool,

    #[serde(default = "default_true")]
    pub run_http: bool,

    #[serde(default = "default_true")]
    pub run_ping: bool,

    #[serde(default = "default_true")]
    pub run_stream: bool,

    /// Run traceroute/MTR during the sweep
    #[serde(default)]
    pub path_analysis: bool,

    /// Query EC2 instance metadata before the sweep
    #[serde(default)]
    pub instance_metadata: bool,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            tcp_samples: default_tcp_samples(),
            tcp_interval_ms: default_tcp_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            ping_url: default_ping_url(),
            ping_samples: default_ping_samples(),
            ping_interval_ms: default_ping_interval_ms(),
            stream_url: default_stream_url(),
            topic: default_topic(),
            stream_duration_secs: default_stream_duration_secs(),
            stream_warmup_secs: default_stream_warmup_secs(),
            http_ping_url: default_http_ping_url(),
            http_samples: default_http_samples(),
            endpoints: default_endpoints(),
            disable_ssl: false,
            output_dir: None,
            run_tcp: true,
            run_http: true,
            run_ping: true,
            run_stream: true,
            path_analysis: false,
            instance_metadata: false,
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// TCP port to probe
    pub fn tcp_port(&self) -> u16 {
        self.port.unwrap_or(if self.disable_ssl { 80 } else { 443 })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn tcp_interval(&self) -> Duration {
        Duration::from_millis(self.tcp_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn stream_duration(&self) -> Duration {
        Duration::from_secs(self.stream_duration_secs)
    }

    pub fn stream_warmup(&self) -> Duration {
        Duration::from_secs(self.stream_warmup_secs)
    }

    /// HTTP scheme honouring `disable_ssl`
    pub fn http_scheme(&self) -> &'static str {
        if self.disable_ssl {
            "http"
        } else {
            "https"
        }
    }

    /// REST ping URL for a named sweep endpoint.
    ///
    /// Only endpoints whose name mentions `api` or `futures` are pinged. The
    /// path follows the host; unknown hosts are pinged at their root.
    pub fn endpoint_ping_url(&self, name: &str) -> Option<String> {
        if !(name.contains("api") || name.contains("futures")) {
            return None;
        }
        let host = self.endpoints.get(name)?;
        let path = crate::defaults::ENDPOINT_PING_PATHS
            .iter()
            .find(|(known, _)| *known == host.as_str())
            .map(|(_, path)| *path)
            .unwrap_or("");
        Some(format!("{}://{}{}", self.http_scheme(), host, path))
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::config("Probe host cannot be empty"));
        }

        if self.port == Some(0) {
            return Err(AppError::config("Port must be greater than 0"));
        }

        if self.run_tcp && self.tcp_samples < 2 {
            return Err(AppError::config("TCP sample count must be at least 2"));
        }

        if self.run_ping && self.ping_samples < 2 {
            return Err(AppError::config("Ping sample count must be at least 2"));
        }

        if self.run_http && self.http_ping_url.is_some() && self.http_samples < 2 {
            return Err(AppError::config("HTTP sample count must be at least 2"));
        }

        if self.connect_timeout_secs == 0 {
            return Err(AppError::config("Connect timeout must be greater than 0"));
        }

        if self.connect_timeout_secs > 300 {
            return Err(AppError::config("Connect timeout cannot exceed 300 seconds"));
        }

        if self.run_stream && self.stream_duration_secs == 0 {
            return Err(AppError::config("Stream duration must be greater than 0"));
        }

        if self.topic.trim().is_empty() {
            return Err(AppError::config("Stream topic cannot be empty"));
        }

        for (label, url) in [("ping", &self.ping_url), ("stream", &self.stream_url)] {
            let parsed = url::Url::parse(url)
                .map_err(|e| AppError::config(format!("Invalid {} URL '{}': {}", label, url, e)))?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(AppError::config(format!("{} URL must use ws:// or wss://: {}", label, url)));
            }
        }

        if let Some(url) = &self.http_ping_url {
            let parsed = url::Url::parse(url)
                .map_err(|e| AppError::config(format!("Invalid HTTP ping URL '{}': {}", url, e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(AppError::config(format!("HTTP ping URL must use http:// or https://: {}", url)));
            }
        }

        for (name, host) in &self.endpoints {
            if host.trim().is_empty() {
                return Err(AppError::config(format!("Endpoint '{}' has an empty host", name)));
            }
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(endpoints) = std::env::var("BINANCE_ENDPOINTS") {
            self.endpoints = serde_json::from_str(&endpoints)
                .map_err(|e| AppError::config(format!("Invalid BINANCE_ENDPOINTS JSON: {}", e)))?;
        }

        // Presence alone disables SSL, whatever the value
        if std::env::var_os("DISABLE_SSL").is_some() {
            self.disable_ssl = true;
        }

        if let Ok(host) = std::env::var("PROBE_HOST") {
            self.host = host.trim().to_string();
        }

        if let Ok(samples) = std::env::var("PROBE_TCP_SAMPLES") {
            self.tcp_samples = samples.parse()
                .map_err(|e| AppError::config(format!("Invalid PROBE_TCP_SAMPLES value '{}': {}", samples, e)))?;
        }

        if let Ok(samples) = std::env::var("PROBE_PING_SAMPLES") {
            self.ping_samples = samples.parse()
                .map_err(|e| AppError::config(format!("Invalid PROBE_PING_SAMPLES value '{}': {}", samples, e)))?;
        }

        if let Ok(interval) = std::env::var("PROBE_PING_INTERVAL_MS") {
            self.ping_interval_ms = interval.parse()
                .map_err(|e| AppError::config(format!("Invalid PROBE_PING_INTERVAL_MS value '{}': {}", interval, e)))?;
        }

        if let Ok(duration) = std::env::var("PROBE_STREAM_DURATION_SECS") {
            self.stream_duration_secs = duration.parse()
                .map_err(|e| AppError::config(format!("Invalid PROBE_STREAM_DURATION_SECS value '{}': {}", duration, e)))?;
        }

        if let Ok(warmup) = std::env::var("PROBE_STREAM_WARMUP_SECS") {
            self.stream_warmup_secs = warmup.parse()
                .map_err(|e| AppError::config(format!("Invalid PROBE_STREAM_WARMUP_SECS value '{}': {}", warmup, e)))?;
        }

        if let Ok(dir) = std::env::var("PROBE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = Some(PathBuf::from(dir.trim()));
            }
        }

        if let Ok(enable_color) = std::env::var("ENABLE_COLOR") {
            self.enable_color = enable_color.parse()
                .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", enable_color, e)))?;
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_host() -> String {
    crate::defaults::DEFAULT_HOST.to_string()
}

fn default_tcp_samples() -> u32 {
    crate::defaults::DEFAULT_TCP_SAMPLES
}

fn default_tcp_interval_ms() -> u64 {
    crate::defaults::DEFAULT_TCP_INTERVAL.as_millis() as u64
}

fn default_connect_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_ping_url() -> String {
    crate::defaults::DEFAULT_WS_URL.to_string()
}

fn default_ping_samples() -> u32 {
    crate::defaults::DEFAULT_PING_SAMPLES
}

fn default_ping_interval_ms() -> u64 {
    crate::defaults::MIN_PING_INTERVAL.as_millis() as u64
}

fn default_stream_url() -> String {
    crate::defaults::DEFAULT_WS_URL.to_string()
}

fn default_topic() -> String {
    crate::defaults::DEFAULT_TOPIC.to_string()
}

fn default_stream_duration_secs() -> u64 {
    crate::defaults::DEFAULT_STREAM_DURATION.as_secs()
}

fn default_stream_warmup_secs() -> u64 {
    crate::defaults::DEFAULT_STREAM_WARMUP.as_secs()
}

fn default_http_ping_url() -> Option<String> {
    Some(crate::defaults::DEFAULT_HTTP_PING_URL.to_string())
}

fn default_http_samples() -> u32 {
    crate::defaults::DEFAULT_HTTP_SAMPLES
}

fn default_endpoints() -> BTreeMap<String, String> {
    crate::defaults::DEFAULT_ENDPOINTS
        .iter()
        .map(|&(name, host)| (name.to_string(), host.to_string()))
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
