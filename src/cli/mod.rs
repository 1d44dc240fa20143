//! Command-line interface

use clap::Parser;
use std::path::PathBuf;

/// Exchange Latency Probe - measure TCP, HTTP, WebSocket and stream latency
/// to exchange endpoints
#[derive(Parser, Debug, Clone)]
#[command(name = "elp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Host for the TCP connect probe
    #[arg(long, env = "PROBE_HOST")]
    pub host: Option<String>,

    /// TCP port (default 443, or 80 with DISABLE_SSL)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of measured TCP connects
    #[arg(long, env = "PROBE_TCP_SAMPLES")]
    pub tcp_samples: Option<u32>,

    /// Pause between TCP connects in milliseconds
    #[arg(long)]
    pub tcp_interval_ms: Option<u64>,

    /// Per-connect timeout in seconds
    #[arg(short = 't', long, value_parser = parse_duration)]
    pub connect_timeout: Option<u64>,

    /// Bare WebSocket endpoint for the ping/pong probe
    #[arg(long)]
    pub ping_url: Option<String>,

    /// Number of ping/pong samples
    #[arg(long, env = "PROBE_PING_SAMPLES")]
    pub ping_samples: Option<u32>,

    /// Ping interval in milliseconds (raised to 200 if lower)
    #[arg(long, env = "PROBE_PING_INTERVAL_MS")]
    pub ping_interval_ms: Option<u64>,

    /// WebSocket endpoint for the stream event probe
    #[arg(long)]
    pub stream_url: Option<String>,

    /// Stream topic to subscribe to, e.g. btcusdt@trade
    #[arg(long)]
    pub topic: Option<String>,

    /// Stream measurement window in seconds
    #[arg(long, env = "PROBE_STREAM_DURATION_SECS")]
    pub stream_duration: Option<u64>,

    /// Stream warmup window in seconds
    #[arg(long, env = "PROBE_STREAM_WARMUP_SECS")]
    pub stream_warmup: Option<u64>,

    /// REST ping URL for the HTTP probe
    #[arg(long)]
    pub http_ping_url: Option<String>,

    /// Skip the TCP connect probe
    #[arg(long)]
    pub skip_tcp: bool,

    /// Skip the HTTP ping probe
    #[arg(long)]
    pub skip_http: bool,

    /// Skip the WebSocket ping/pong probe
    #[arg(long)]
    pub skip_ping: bool,

    /// Skip the stream event probe
    #[arg(long)]
    pub skip_stream: bool,

    /// Sweep every endpoint in the endpoint table instead of comparing probes
    #[arg(long)]
    pub sweep: bool,

    /// Run traceroute and mtr for each endpoint during the sweep
    #[arg(long, requires = "sweep")]
    pub path_analysis: bool,

    /// Record EC2 instance metadata with the sweep
    #[arg(long, requires = "sweep")]
    pub instance_metadata: bool,

    /// Directory for JSON result records
    #[arg(short, long, env = "PROBE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Force colored output
    #[arg(long)]
    pub color: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Validate CLI arguments for conflicts
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if !self.sweep && self.skip_tcp && self.skip_http && self.skip_ping && self.skip_stream {
            return Err("All probes are skipped; nothing to measure".to_string());
        }

        if let Some(samples) = self.ping_samples {
            if samples < 2 {
                return Err("--ping-samples must be at least 2".to_string());
            }
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Probes selected on the command line, in run order
    pub fn selected_probes(&self) -> Vec<&'static str> {
        let mut probes = Vec::new();
        if !self.skip_tcp {
            probes.push("tcp");
        }
        if !self.skip_http {
            probes.push("http");
        }
        if !self.skip_ping {
            probes.push("ping");
        }
        if !self.skip_stream {
            probes.push("stream");
        }
        probes
    }

    /// Get configuration summary for display
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Command line:\n");
        summary.push_str(&format!("  Mode: {}\n", if self.sweep { "endpoint sweep" } else { "probe comparison" }));
        if !self.sweep {
            summary.push_str(&format!("  Probes: {}\n", self.selected_probes().join(", ")));
        }
        if let Some(ref host) = self.host {
            summary.push_str(&format!("  Host: {}\n", host));
        }
        if let Some(port) = self.port {
            summary.push_str(&format!("  Port: {}\n", port));
        }
        if let Some(ref dir) = self.output_dir {
            summary.push_str(&format!("  Output directory: {}\n", dir.display()));
        }
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));

        summary
    }
}

/// Parse a timeout in whole seconds
fn parse_duration(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 300 {
                Err("Duration cannot exceed 300 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
pub fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    cfg!(unix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_basic() {
        let cli = Cli::parse_from(["elp", "--host", "fstream.binance.com", "--tcp-samples", "50"]);
        assert_eq!(cli.host.as_deref(), Some("fstream.binance.com"));
        assert_eq!(cli.tcp_samples, Some(50));
        assert!(!cli.sweep);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parsing_all_options() {
        let cli = Cli::parse_from([
            "elp",
            "--host", "stream.binance.com",
            "--port", "9443",
            "--tcp-samples", "10",
            "--tcp-interval-ms", "50",
            "--connect-timeout", "3",
            "--ping-url", "wss://stream.binance.com:9443/ws",
            "--ping-samples", "30",
            "--ping-interval-ms", "250",
            "--stream-url", "wss://fstream.binance.com/ws",
            "--topic", "ethusdt@aggTrade",
            "--stream-duration", "20",
            "--stream-warmup", "2",
            "--http-ping-url", "https://api.binance.com/api/v3/ping",
            "--skip-http",
            "--output-dir", "results",
            "--no-color",
            "--verbose",
            "--debug",
        ]);

        assert_eq!(cli.port, Some(9443));
        assert_eq!(cli.tcp_interval_ms, Some(50));
        assert_eq!(cli.connect_timeout, Some(3));
        assert_eq!(cli.ping_samples, Some(30));
        assert_eq!(cli.ping_interval_ms, Some(250));
        assert_eq!(cli.topic.as_deref(), Some("ethusdt@aggTrade"));
        assert_eq!(cli.stream_duration, Some(20));
        assert_eq!(cli.stream_warmup, Some(2));
        assert!(cli.skip_http);
        assert_eq!(cli.output_dir, Some(PathBuf::from("results")));
        assert!(cli.no_color);
        assert!(cli.debug);
        assert_eq!(cli.selected_probes(), vec!["tcp", "ping", "stream"]);
    }

    #[test]
    fn test_sweep_flags_require_sweep() {
        assert!(Cli::try_parse_from(["elp", "--path-analysis"]).is_err());
        assert!(Cli::try_parse_from(["elp", "--instance-metadata"]).is_err());

        let cli = Cli::try_parse_from(["elp", "--sweep", "--path-analysis", "--instance-metadata"]).unwrap();
        assert!(cli.sweep && cli.path_analysis && cli.instance_metadata);
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("5"), Ok(5));
        assert_eq!(parse_duration("300"), Ok(300));
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("301").is_err());
        assert!(parse_duration("+5").is_err());
        assert!(parse_duration("0x10").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[test]
    fn test_cli_validation() {
        let cli = Cli::parse_from(["elp", "--color", "--no-color"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(["elp", "--skip-tcp", "--skip-http", "--skip-ping", "--skip-stream"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(["elp", "--skip-tcp", "--skip-http", "--skip-ping", "--skip-stream", "--sweep"]);
        assert!(cli.validate().is_ok());

        let cli = Cli::parse_from(["elp", "--ping-samples", "1"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_use_colors_method() {
        let cli = Cli::parse_from(["elp", "--color"]);
        assert!(cli.use_colors());

        let cli = Cli::parse_from(["elp", "--no-color"]);
        assert!(!cli.use_colors());
    }

    #[test]
    fn test_config_summary() {
        let cli = Cli::parse_from(["elp", "--sweep", "--host", "api.binance.com", "--no-color"]);
        let summary = cli.get_config_summary();
        assert!(summary.contains("Mode: endpoint sweep"));
        assert!(summary.contains("Host: api.binance.com"));
        assert!(summary.contains("Colored output: false"));
        assert!(!summary.contains("Probes:"));
    }
}
