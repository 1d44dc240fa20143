//! Soft configuration checks
//!
//! [`Config::validate`] rejects configurations that cannot run. The checks
//! here flag settings that will run but may not measure what the user
//! expects.

use crate::{error::Result, models::Config};
use colored::*;
use std::time::Duration;

/// Configuration validator with advisory rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Hard validation followed by the advisory checks
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_ping_settings(config));
        warnings.extend(Self::validate_stream_settings(config));
        warnings.extend(Self::validate_tcp_settings(config));
        warnings.extend(Self::validate_endpoints(config));
        Ok(warnings)
    }

    fn validate_ping_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if !config.run_ping {
            return warnings;
        }

        let min = crate::defaults::MIN_PING_INTERVAL;
        if config.ping_interval() < min {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Ping interval {}ms is below the exchange rate limit; {}ms will be used",
                    config.ping_interval_ms,
                    min.as_millis()
                ),
            ));
        }

        let expected = config.ping_interval().max(min) * config.ping_samples;
        if expected > Duration::from_secs(600) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Ping/pong probe will take about {} minutes", expected.as_secs() / 60),
            ));
        }

        warnings
    }

    fn validate_stream_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if !config.run_stream {
            return warnings;
        }

        if config.stream_warmup_secs < 2 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Stream warmup of {}s may include the subscription snapshot burst in the results",
                    config.stream_warmup_secs
                ),
            ));
        }

        if config.stream_duration_secs < 10 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Stream window of {}s may collect too few events on quiet topics",
                    config.stream_duration_secs
                ),
            ));
        }

        if !config.topic.contains('@') {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Topic '{}' does not look like <symbol>@<stream>", config.topic),
            ));
        }

        warnings
    }

    fn validate_tcp_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if !config.run_tcp {
            return warnings;
        }

        if config.tcp_samples < 10 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Only {} TCP samples; percentiles will be coarse", config.tcp_samples),
            ));
        }

        if config.disable_ssl && config.port.is_none() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "SSL disabled; TCP probe uses port 80".to_string(),
            ));
        }

        warnings
    }

    fn validate_endpoints(config: &Config) -> Vec<ValidationWarning> {
        config
            .endpoints
            .iter()
            .filter(|(_, host)| host.contains("://") || host.contains('/'))
            .map(|(name, host)| {
                ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("Endpoint '{}' should be a bare host name, got '{}'", name, host),
                )
            })
            .collect()
    }
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    /// Get display string for level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Get color for terminal display
    pub fn color(&self) -> Color {
        match self {
            Self::Info => Color::Blue,
            Self::Warning => Color::Yellow,
            Self::Error => Color::Red,
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if use_color {
            format!("{} {}", tag.color(self.level.color()), self.message)
        } else {
            format!("{} {}", tag, self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
