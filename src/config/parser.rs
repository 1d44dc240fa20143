//! Configuration layering: defaults, .env file, environment, command line

use crate::{cli::Cli, config::env::EnvManager, error::Result, models::Config};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Build and validate the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Apply explicitly given CLI arguments on top of `config`
    pub fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(host) = &cli.host {
            config.host = host.trim().to_string();
        }
        if cli.port.is_some() {
            config.port = cli.port;
        }
        if let Some(samples) = cli.tcp_samples {
            config.tcp_samples = samples;
        }
        if let Some(interval) = cli.tcp_interval_ms {
            config.tcp_interval_ms = interval;
        }
        if let Some(timeout) = cli.connect_timeout {
            config.connect_timeout_secs = timeout;
        }
        if let Some(url) = &cli.ping_url {
            config.ping_url = url.clone();
        }
        if let Some(samples) = cli.ping_samples {
            config.ping_samples = samples;
        }
        if let Some(interval) = cli.ping_interval_ms {
            config.ping_interval_ms = interval;
        }
        if let Some(url) = &cli.stream_url {
            config.stream_url = url.clone();
        }
        if let Some(topic) = &cli.topic {
            config.topic = topic.clone();
        }
        if let Some(secs) = cli.stream_duration {
            config.stream_duration_secs = secs;
        }
        if let Some(secs) = cli.stream_warmup {
            config.stream_warmup_secs = secs;
        }
        if let Some(url) = &cli.http_ping_url {
            config.http_ping_url = Some(url.clone());
        }
        if let Some(dir) = &cli.output_dir {
            config.output_dir = Some(dir.clone());
        }

        config.run_tcp = !cli.skip_tcp;
        config.run_http = !cli.skip_http;
        config.run_ping = !cli.skip_ping;
        config.run_stream = !cli.skip_stream;
        config.path_analysis = cli.path_analysis;
        config.instance_metadata = cli.instance_metadata;

        if cli.color {
            config.enable_color = true;
        }
        if cli.no_color {
            config.enable_color = false;
        }

        // CLI-only
        config.verbose = cli.verbose;
        config.debug = cli.debug;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Host: {}:{}", config.host, config.tcp_port()));
    summary.push(format!(
        "TCP: {} samples, {}ms interval, {}s timeout",
        config.tcp_samples, config.tcp_interval_ms, config.connect_timeout_secs
    ));
    summary.push(format!(
        "HTTP ping: {}",
        config.http_ping_url.as_deref().unwrap_or("disabled")
    ));
    summary.push(format!(
        "Ping/pong: {} ({} samples, {}ms interval)",
        config.ping_url, config.ping_samples, config.ping_interval_ms
    ));
    summary.push(format!(
        "Stream: {} [{}] ({}s warmup, {}s window)",
        config.stream_url, config.topic, config.stream_warmup_secs, config.stream_duration_secs
    ));
    summary.push(format!(
        "Endpoints: {}",
        config.endpoints.keys().cloned().collect::<Vec<_>>().join(", ")
    ));
    summary.push(format!(
        "Output directory: {}",
        config
            .output_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "none".to_string())
    ));
    summary.push(format!("SSL disabled: {}", config.disable_ssl));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn overridden(args: &[&str]) -> Config {
        let mut config = Config::default();
        ConfigParser::new(Cli::parse_from(args)).apply_cli_overrides(&mut config);
        config
    }

    #[test]
    fn test_cli_overrides() {
        let config = overridden(&[
            "elp",
            "--host", "fstream.binance.com",
            "--tcp-samples", "50",
            "--connect-timeout", "2",
            "--ping-interval-ms", "500",
            "--topic", "ethusdt@trade",
            "--output-dir", "out",
            "--no-color",
            "--verbose",
        ]);

        assert_eq!(config.host, "fstream.binance.com");
        assert_eq!(config.tcp_samples, 50);
        assert_eq!(config.connect_timeout_secs, 2);
        assert_eq!(config.ping_interval_ms, 500);
        assert_eq!(config.topic, "ethusdt@trade");
        assert_eq!(config.output_dir, Some(PathBuf::from("out")));
        assert!(!config.enable_color);
        assert!(config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_absent_flags_keep_lower_layers() {
        let mut config = Config {
            stream_duration_secs: 15,
            http_ping_url: None,
            ..Default::default()
        };
        ConfigParser::new(Cli::parse_from(["elp", "--skip-stream"])).apply_cli_overrides(&mut config);

        assert_eq!(config.stream_duration_secs, 15);
        assert_eq!(config.http_ping_url, None);
        assert!(!config.run_stream);
        assert!(config.run_tcp);
    }

    #[test]
    fn test_sweep_flags() {
        let config = overridden(&["elp", "--sweep", "--path-analysis", "--instance-metadata"]);
        assert!(config.path_analysis);
        assert!(config.instance_metadata);
    }

    #[test]
    fn test_config_summary() {
        let summary = display_config_summary(&Config::default());
        assert!(summary.contains("Host: stream.binance.com:443"));
        assert!(summary.contains("btcusdt@trade"));
        assert!(summary.contains("spot_api"));
        assert!(summary.contains("Output directory: none"));
    }
}
