//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    /// Load a specific env file; a missing file is not an error
    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} file found, using defaults and CLI arguments", path.display());
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# Exchange Latency Probe Configuration
#
# Values here are defaults; environment variables and command-line
# arguments override them.

# Named endpoints for --sweep (JSON object, name -> host)
# BINANCE_ENDPOINTS={"spot_api":"api.binance.com","futures_api":"fapi.binance.com"}

# Probe plain HTTP / port 80 instead of TLS / port 443 (any value, even 0)
# DISABLE_SSL=1

# Host for the TCP connect probe
# PROBE_HOST=stream.binance.com

# Number of measured TCP connects
# PROBE_TCP_SAMPLES=20

# WebSocket ping/pong samples and interval (interval is raised to 200ms if lower)
# PROBE_PING_SAMPLES=100
# PROBE_PING_INTERVAL_MS=200

# Stream event probe windows in seconds
# PROBE_STREAM_DURATION_SECS=60
# PROBE_STREAM_WARMUP_SECS=5

# Directory for JSON result records
# PROBE_OUTPUT_DIR=./results

# Enable colored output (true/false)
# ENABLE_COLOR=true
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "BINANCE_ENDPOINTS" => {
                let endpoints: BTreeMap<String, String> = serde_json::from_str(value)
                    .map_err(|e| AppError::config(format!("Invalid BINANCE_ENDPOINTS JSON: {}", e)))?;
                if endpoints.is_empty() {
                    return Err(AppError::config("BINANCE_ENDPOINTS must name at least one endpoint"));
                }
            }
            "PROBE_HOST" => {
                if value.trim().is_empty() {
                    return Err(AppError::config("PROBE_HOST cannot be empty"));
                }
            }
            "PROBE_TCP_SAMPLES" | "PROBE_PING_SAMPLES" => {
                let count: u32 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if count < 2 {
                    return Err(AppError::config(format!("{} must be at least 2, got: {}", key, count)));
                }
            }
            "PROBE_PING_INTERVAL_MS" | "PROBE_STREAM_WARMUP_SECS" => {
                value
                    .parse::<u64>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "PROBE_STREAM_DURATION_SECS" => {
                let secs: u64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if secs == 0 {
                    return Err(AppError::config("PROBE_STREAM_DURATION_SECS must be greater than 0"));
                }
            }
            "ENABLE_COLOR" => {
                value
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", value, e)))?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("BINANCE_ENDPOINTS", "JSON object of sweep endpoints", r#"{"spot_api":"api.binance.com"}"#),
            ("DISABLE_SSL", "Use port 80 and plain schemes when set (any value)", "1"),
            ("PROBE_HOST", "Host for the TCP connect probe", "stream.binance.com"),
            ("PROBE_TCP_SAMPLES", "Measured TCP connects (>= 2)", "20"),
            ("PROBE_PING_SAMPLES", "WebSocket ping/pong samples (>= 2)", "100"),
            ("PROBE_PING_INTERVAL_MS", "Ping interval in milliseconds", "200"),
            ("PROBE_STREAM_DURATION_SECS", "Stream measurement window", "60"),
            ("PROBE_STREAM_WARMUP_SECS", "Stream warmup window", "5"),
            ("PROBE_OUTPUT_DIR", "Directory for JSON results", "./results"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<28} {}\n", var, description));
            help.push_str(&format!("  {:<28} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(name, _, _)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }
}
