//! Structured logging for the exchange latency probe
//!
//! This module provides:
//! - Structured logging with multiple levels and contexts
//! - Correlation IDs for grouping the events of one probe run
//! - Probe lifecycle and anomaly logging
//! - JSON structured output for integration with log aggregators

use crate::error::{AppError, Result};
use crate::models::{Config, ProbeResult};
use crate::types::ProbeKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - most detailed
    Trace = 0,
    /// Debug level - detailed information for debugging
    Debug = 1,
    /// Info level - general application information
    Info = 2,
    /// Warning level - potentially harmful situations
    Warn = 3,
    /// Error level - error events but application can continue
    Error = 4,
    /// Fatal level - severe error events that cause application termination
    Fatal = 5,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Get ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",    // White
            LogLevel::Debug => "\x1b[36m",    // Cyan
            LogLevel::Info => "\x1b[32m",     // Green
            LogLevel::Warn => "\x1b[33m",     // Yellow
            LogLevel::Error => "\x1b[31m",    // Red
            LogLevel::Fatal => "\x1b[35m",    // Magenta
        }
    }

    /// Reset ANSI color code
    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp when log entry was created
    pub timestamp: DateTime<Utc>,
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    /// Additional structured fields
    pub fields: HashMap<String, serde_json::Value>,
    /// Thread name if available
    pub thread_id: Option<String>,
}

/// Logger with multiple output formats.
///
/// Clones share the same context, so a session ID set on one clone is seen
/// by all of them.
#[derive(Clone)]
pub struct Logger {
    /// Minimum log level to output
    min_level: LogLevel,
    /// Whether to use colored output
    use_color: bool,
    /// Output format
    format: LogFormat,
    /// Logger name
    name: String,
    /// Shared context storage
    context: Arc<RwLock<LogContext>>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    /// Global correlation ID for the session
    session_id: Option<String>,
    /// Current operation correlation ID
    current_correlation_id: Option<String>,
    /// Additional context fields
    context_fields: HashMap<String, serde_json::Value>,
}

impl Logger {
    /// Create a new logger
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            format: LogFormat::Console,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Create a logger with specific configuration
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Logger that drops everything below `Fatal`; used by tests and quiet runs
    pub fn silent(name: &str) -> Self {
        let mut logger = Self::new(name.to_string());
        logger.set_level(LogLevel::Fatal);
        logger
    }

    /// Set minimum log level
    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Set output format
    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    /// Enable or disable colored output
    pub fn set_color(&mut self, use_color: bool) {
        self.use_color = use_color;
    }

    /// Logger name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set session correlation ID
    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Add context field for all subsequent log entries
    pub async fn add_context_field<T: Serialize>(&self, key: String, value: T) {
        if let Ok(json_value) = serde_json::to_value(value) {
            let mut context = self.context.write().await;
            context.context_fields.insert(key, json_value);
        }
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.info(&format!("Started operation: {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "start")
            .log()
            .await;

        correlation_id
    }

    /// End a correlated operation
    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.info(&format!("Completed operation: {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "end")
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    /// Convenience methods for different log levels
    pub fn trace(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    pub fn fatal(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Fatal, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Write log entry to output
    async fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        if entry.correlation_id.is_none() {
            entry.correlation_id = context.current_correlation_id.clone();
        }
        for (key, value) in &context.context_fields {
            entry.fields.insert(key.clone(), value.clone());
        }
        drop(context);

        let output = match self.format {
            LogFormat::Console => self.format_console(&entry),
            LogFormat::Json => self.format_json(&entry),
            LogFormat::Compact => self.format_compact(&entry),
        };

        // Write to stderr for errors/warnings, stdout for others
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", output);
        } else {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }

    /// Format log entry for console output
    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields_str: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            fields_str.sort();
            output.push_str(&format!(" {{{}}}", fields_str.join(", ")));
        }

        output
    }

    /// Format log entry as JSON
    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": \"{}\"}}", entry.message),
        }
    }

    /// Format log entry in compact format
    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
                thread_id: std::thread::current().name().map(String::from),
            },
        }
    }

    /// Add a correlation ID
    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Add the headline statistics of a probe result
    pub fn probe_stats(self, result: &ProbeResult) -> Self {
        self.field("probe", result.kind.slug())
            .field("target", &result.target)
            .field("count", result.statistics.count)
            .field("mean_ms", result.statistics.mean)
            .field("p50_ms", result.statistics.p50)
            .field("p99_ms", result.statistics.p99)
            .field("lost", result.lost)
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
            .field("error_exit_code", error.exit_code())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Logger for probe lifecycle, skipped samples and data anomalies
#[derive(Clone)]
pub struct ProbeLogger {
    logger: Logger,
}

impl ProbeLogger {
    /// Create a probe logger from configuration
    pub fn new(config: &Config) -> Self {
        Self::from_logger(Logger::with_config("PROBE".to_string(), config))
    }

    /// Wrap an existing logger
    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    /// Underlying logger
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Log the start of a probe run and return its correlation ID
    pub async fn log_probe_start(&self, kind: ProbeKind, target: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        self.logger
            .info(&format!("Starting {} probe against {}", kind, target))
            .correlation_id(&correlation_id)
            .field("probe", kind.slug())
            .field("target", target)
            .log()
            .await;
        correlation_id
    }

    /// Log a finished probe with its headline statistics
    pub async fn log_probe_complete(&self, correlation_id: &str, result: &ProbeResult) {
        self.logger
            .info(&format!(
                "{} probe completed: {} samples, p50={:.3}ms p99={:.3}ms",
                result.kind, result.statistics.count, result.statistics.p50, result.statistics.p99
            ))
            .correlation_id(correlation_id)
            .probe_stats(result)
            .field("elapsed_ms", result.elapsed().num_milliseconds())
            .log()
            .await;
    }

    /// Log a probe that failed outright
    pub async fn log_probe_failed(&self, correlation_id: &str, kind: ProbeKind, error: &AppError) {
        self.logger
            .error(&format!("{} probe failed: {}", kind, error))
            .correlation_id(correlation_id)
            .field("probe", kind.slug())
            .error_info(error)
            .log()
            .await;
    }

    /// Log a single skipped measurement attempt
    pub async fn log_sample_skipped(&self, kind: ProbeKind, attempt: usize, reason: &str) {
        self.logger
            .warn(&format!("{} sample {} skipped: {}", kind, attempt, reason))
            .field("probe", kind.slug())
            .field("attempt", attempt)
            .field("reason", reason)
            .log()
            .await;
    }

    /// Log a data anomaly such as stray pongs, lost pings or clock skew
    pub async fn log_anomaly(&self, kind: ProbeKind, message: &str, count: usize) {
        self.logger
            .warn(message)
            .field("probe", kind.slug())
            .field("anomaly_count", count)
            .log()
            .await;
    }

    /// Log a connection attempt
    pub async fn log_connection(&self, target: &str, success: bool, error: Option<&str>) {
        let level = if success { LogLevel::Debug } else { LogLevel::Warn };
        let message = if success {
            format!("Connected to {}", target)
        } else {
            format!("Failed to connect to {}: {}", target, error.unwrap_or("unknown error"))
        };

        let mut builder = self.logger.log(level, &message).field("target", target).field("success", success);

        if let Some(err) = error {
            builder = builder.field("error", err);
        }

        builder.log().await;
    }

    /// Log DNS resolution outcome
    pub async fn log_dns_resolution(&self, host: &str, addresses: usize, duration_ms: f64) {
        self.logger
            .debug(&format!("Resolved {} to {} address(es) in {:.1}ms", host, addresses, duration_ms))
            .field("host", host)
            .field("addresses", addresses)
            .field("duration_ms", duration_ms)
            .log()
            .await;
    }
}

/// Global logger factory and management
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    /// Create a new logger factory
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a logger with a specific name
    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name.to_string(), &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    /// Create a probe logger sharing the session ID
    pub async fn create_probe_logger(&self) -> ProbeLogger {
        ProbeLogger::from_logger(self.create_logger("PROBE").await)
    }

    /// Get session ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatisticsAccumulator;
    use std::str::FromStr;

    fn sample_entry(correlation_id: Option<&str>) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: "Test message".to_string(),
            logger: "TEST".to_string(),
            correlation_id: correlation_id.map(String::from),
            fields: {
                let mut map = HashMap::new();
                map.insert("probe".to_string(), serde_json::Value::String("tcp".to_string()));
                map
            },
            thread_id: None,
        }
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[tokio::test]
    async fn test_logger_with_config() {
        let config = Config {
            debug: true,
            verbose: true,
            enable_color: false,
            ..Default::default()
        };

        let logger = Logger::with_config("TEST".to_string(), &config);
        assert_eq!(logger.min_level, LogLevel::Debug);
        assert!(!logger.use_color);
        assert_eq!(logger.format, LogFormat::Json);

        let quiet = Logger::with_config("TEST".to_string(), &Config::default());
        assert_eq!(quiet.min_level, LogLevel::Warn);
    }

    #[test]
    fn test_clones_share_context() {
        tokio_test::block_on(async {
            let logger = Logger::new("TEST".to_string());
            let clone = logger.clone();
            logger.set_session_id("shared-session".to_string()).await;

            let context = clone.context.read().await;
            assert_eq!(context.session_id.as_deref(), Some("shared-session"));
        });
    }

    #[tokio::test]
    async fn test_operation_correlation() {
        let logger = Logger::silent("TEST");
        let correlation_id = logger.start_operation("comparison").await;
        assert!(!correlation_id.is_empty());
        assert_eq!(
            logger.context.read().await.current_correlation_id.as_deref(),
            Some(correlation_id.as_str())
        );

        logger.end_operation(&correlation_id, "comparison", true).await;
        assert!(logger.context.read().await.current_correlation_id.is_none());
    }

    #[tokio::test]
    async fn test_would_log() {
        let mut logger = Logger::new("TEST".to_string());
        logger.set_level(LogLevel::Warn);

        assert!(!logger.would_log(LogLevel::Debug));
        assert!(!logger.would_log(LogLevel::Info));
        assert!(logger.would_log(LogLevel::Warn));
        assert!(logger.would_log(LogLevel::Fatal));
        assert!(!Logger::silent("Q").would_log(LogLevel::Error));
    }

    #[test]
    fn test_log_formats() {
        let mut logger = Logger::new("TEST".to_string());
        logger.set_color(false);

        let console_output = logger.format_console(&sample_entry(Some("0123456789abcdef")));
        assert!(console_output.contains("INFO"));
        assert!(console_output.contains("Test message"));
        assert!(console_output.contains("[01234567]"));
        assert!(console_output.contains("probe=\"tcp\""));

        // Short IDs are shown whole
        let short = logger.format_console(&sample_entry(Some("abc")));
        assert!(short.contains("[abc]"));

        let json_output = logger.format_json(&sample_entry(None));
        assert!(json_output.starts_with('{'));
        assert!(json_output.ends_with('}'));

        let compact_output = logger.format_compact(&sample_entry(None));
        assert!(compact_output.contains(" I TEST: Test message"));
    }

    #[tokio::test]
    async fn test_probe_logger_events() {
        let logger = ProbeLogger::from_logger(Logger::silent("PROBE"));
        let id = logger.log_probe_start(ProbeKind::TcpConnect, "127.0.0.1:443").await;
        assert_eq!(id.len(), 36);

        let mut acc = StatisticsAccumulator::new();
        acc.add(1.0);
        acc.add(2.0);
        let result = ProbeResult::from_accumulator(ProbeKind::TcpConnect, "127.0.0.1:443", acc, Utc::now()).unwrap();

        logger.log_probe_complete(&id, &result).await;
        logger.log_sample_skipped(ProbeKind::TcpConnect, 3, "connection refused").await;
        logger.log_anomaly(ProbeKind::WsPingPong, "2 stray pongs", 2).await;
        logger.log_probe_failed(&id, ProbeKind::StreamEvent, &AppError::timeout("open")).await;
        logger.log_connection("stream.binance.com:443", false, Some("refused")).await;
        logger.log_dns_resolution("stream.binance.com", 2, 12.5).await;
    }

    #[test]
    fn test_error_info_fields() {
        let logger = Logger::silent("TEST");
        let builder = logger.error("ping failed").error_info(&AppError::timeout("open"));
        let fields = &builder.entry.fields;
        assert_eq!(fields["error_category"], serde_json::json!("TIMEOUT"));
        assert_eq!(fields["error_recoverable"], serde_json::json!(true));
        assert_eq!(fields["error_exit_code"], serde_json::json!(3));

        let mut plain = Logger::new("TEST".to_string());
        plain.set_color(false);
        let line = plain.format_console(&builder.entry);
        assert!(line.ends_with("error_recoverable=true}"), "{}", line);
    }

    #[tokio::test]
    async fn test_logger_factory() {
        let factory = LoggerFactory::new(Config::default());

        let logger = factory.create_logger("TEST").await;
        assert_eq!(logger.name(), "TEST");

        let probe_logger = factory.create_probe_logger().await;
        let context = probe_logger.logger().context.read().await;
        assert_eq!(context.session_id.as_deref(), Some(factory.session_id()));
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = sample_entry(None);
        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: LogEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.level, LogLevel::Info);
        assert_eq!(deserialized.message, "Test message");
        assert_eq!(deserialized.logger, "TEST");
    }
}
