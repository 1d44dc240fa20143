//! TCP connection establishment latency

use super::{ProbePhase, ProgressObserver};
use crate::dns::{resolve_preferred, HostResolver};
use crate::error::Result;
use crate::logging::ProbeLogger;
use crate::models::{Config, ProbeResult};
use crate::stats::StatisticsAccumulator;
use crate::types::ProbeKind;
use async_trait::async_trait;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Parameters of a TCP connect probe
#[derive(Debug, Clone)]
pub struct TcpProbeConfig {
    pub host: String,
    pub port: u16,
    /// Measured connects
    pub samples: usize,
    /// Sleep after each measured connect
    pub interval: Duration,
    /// Per-connect socket timeout
    pub connect_timeout: Duration,
    pub warmup_count: usize,
    pub warmup_interval: Duration,
}

impl TcpProbeConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            samples: crate::defaults::DEFAULT_TCP_SAMPLES as usize,
            interval: crate::defaults::DEFAULT_TCP_INTERVAL,
            connect_timeout: crate::defaults::DEFAULT_CONNECT_TIMEOUT,
            warmup_count: crate::defaults::TCP_WARMUP_COUNT,
            warmup_interval: crate::defaults::TCP_WARMUP_INTERVAL,
        }
    }

    /// Probe parameters for the configured host
    pub fn from_config(config: &Config) -> Self {
        Self::for_host(config, &config.host)
    }

    /// Probe parameters for an arbitrary host using the configured pacing
    pub fn for_host(config: &Config, host: &str) -> Self {
        Self {
            samples: config.tcp_samples as usize,
            interval: config.tcp_interval(),
            connect_timeout: config.connect_timeout(),
            ..Self::new(host, config.tcp_port())
        }
    }
}

/// Opens TCP connections for the probe
#[async_trait]
pub trait TcpConnector: Send + Sync {
    async fn connect(&self, addr: SocketAddr) -> std::io::Result<TcpStream>;
}

/// Plain tokio connector with Nagle disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioConnector;

#[async_trait]
impl TcpConnector for TokioConnector {
    async fn connect(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Measures TCP handshake time: resolve, warm up, measure, report
pub struct TcpConnectProbe {
    config: TcpProbeConfig,
    resolver: Arc<dyn HostResolver>,
    connector: Arc<dyn TcpConnector>,
    logger: ProbeLogger,
}

impl TcpConnectProbe {
    pub fn new(config: TcpProbeConfig, resolver: Arc<dyn HostResolver>, logger: ProbeLogger) -> Self {
        Self {
            config,
            resolver,
            connector: Arc::new(TokioConnector),
            logger,
        }
    }

    /// Replace the connector
    pub fn with_connector(mut self, connector: Arc<dyn TcpConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Run the probe.
    ///
    /// Resolution failure is fatal. Individual connect failures are logged
    /// and skipped, and are reported as `lost`.
    pub async fn run(self, observer: &dyn ProgressObserver) -> Result<ProbeResult> {
        let kind = ProbeKind::TcpConnect;
        let target = format!("{}:{}", self.config.host, self.config.port);
        let correlation_id = self.logger.log_probe_start(kind, &target).await;

        observer.on_phase(kind, ProbePhase::Connecting);
        let resolve_start = Instant::now();
        let ip = match resolve_preferred(self.resolver.as_ref(), &self.config.host).await {
            Ok(ip) => ip,
            Err(e) => {
                self.logger.log_probe_failed(&correlation_id, kind, &e).await;
                return Err(e);
            }
        };
        self.logger
            .log_dns_resolution(&self.config.host, 1, resolve_start.elapsed().as_secs_f64() * 1000.0)
            .await;
        let addr = SocketAddr::new(ip, self.config.port);

        observer.on_phase(kind, ProbePhase::Warmup);
        for _ in 0..self.config.warmup_count {
            let _ = tokio::time::timeout(self.config.connect_timeout, self.connector.connect(addr)).await;
            tokio::time::sleep(self.config.warmup_interval).await;
        }

        observer.on_phase(kind, ProbePhase::Measuring);
        let started_at = Utc::now();
        let mut accumulator = StatisticsAccumulator::with_capacity(self.config.samples);
        let mut skipped = 0;

        for attempt in 1..=self.config.samples {
            let start = Instant::now();
            match tokio::time::timeout(self.config.connect_timeout, self.connector.connect(addr)).await {
                Ok(Ok(stream)) => {
                    let elapsed = start.elapsed();
                    drop(stream);
                    accumulator.add(elapsed.as_secs_f64() * 1000.0);
                }
                Ok(Err(e)) => {
                    skipped += 1;
                    self.logger.log_sample_skipped(kind, attempt, &e.to_string()).await;
                }
                Err(_) => {
                    skipped += 1;
                    let reason = format!("connect timed out after {:?}", self.config.connect_timeout);
                    self.logger.log_sample_skipped(kind, attempt, &reason).await;
                }
            }
            if attempt % crate::defaults::TCP_PROGRESS_EVERY == 0 {
                observer.on_progress(kind, accumulator.len(), Some(self.config.samples));
            }
            tokio::time::sleep(self.config.interval).await;
        }
        observer.on_phase(kind, ProbePhase::Finished);

        if skipped > 0 {
            observer.on_warning(kind, &format!("{} of {} connects failed", skipped, self.config.samples));
        }

        let result = ProbeResult::from_accumulator(kind, addr.to_string(), accumulator, started_at)
            .map(|r| r.with_attempted(self.config.samples).with_lost(skipped));

        match &result {
            Ok(r) => self.logger.log_probe_complete(&correlation_id, r).await,
            Err(e) => self.logger.log_probe_failed(&correlation_id, kind, e).await,
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::StaticResolver;
    use crate::logging::Logger;
    use crate::probe::{NoopObserver, RecordingObserver};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn quick_config(port: u16, samples: usize) -> TcpProbeConfig {
        TcpProbeConfig {
            samples,
            interval: Duration::from_millis(1),
            connect_timeout: Duration::from_secs(1),
            warmup_count: 2,
            warmup_interval: Duration::from_millis(1),
            ..TcpProbeConfig::new("127.0.0.1", port)
        }
    }

    fn quiet_logger() -> ProbeLogger {
        ProbeLogger::from_logger(Logger::silent("PROBE"))
    }

    async fn loopback_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    /// Accepts connections forever and drops them
    fn accept_loop(listener: TcpListener) {
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });
    }

    /// Fails every other measured connect
    struct FlakyConnector {
        calls: AtomicUsize,
        warmup: usize,
    }

    #[async_trait]
    impl TcpConnector for FlakyConnector {
        async fn connect(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.warmup && (call - self.warmup) % 2 == 1 {
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"));
            }
            TokioConnector.connect(addr).await
        }
    }

    #[test]
    fn test_config_from_app_config() {
        let app = Config {
            host: "fstream.binance.com".to_string(),
            tcp_samples: 7,
            tcp_interval_ms: 250,
            ..Default::default()
        };
        let config = TcpProbeConfig::from_config(&app);
        assert_eq!(config.host, "fstream.binance.com");
        assert_eq!(config.port, 443);
        assert_eq!(config.samples, 7);
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.warmup_count, 10);
        assert_eq!(config.warmup_interval, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_probe_loopback() {
        let (listener, port) = loopback_listener().await;
        accept_loop(listener);

        let probe = TcpConnectProbe::new(quick_config(port, 10), Arc::new(StaticResolver::new()), quiet_logger());
        let result = probe.run(&NoopObserver).await.unwrap();

        assert_eq!(result.kind, ProbeKind::TcpConnect);
        assert_eq!(result.statistics.count, 10);
        assert_eq!(result.lost, 0);
        assert_eq!(result.target, format!("127.0.0.1:{}", port));
        assert!(result.statistics.min >= 0.0);
    }

    #[tokio::test]
    async fn test_failed_connects_are_skipped() {
        let (listener, port) = loopback_listener().await;
        accept_loop(listener);

        let connector = Arc::new(FlakyConnector {
            calls: AtomicUsize::new(0),
            warmup: 2,
        });
        let observer = RecordingObserver::new();
        let probe = TcpConnectProbe::new(quick_config(port, 10), Arc::new(StaticResolver::new()), quiet_logger())
            .with_connector(connector);
        let result = probe.run(&observer).await.unwrap();

        assert_eq!(result.statistics.count, 5);
        assert_eq!(result.samples.len(), 5);
        assert_eq!(result.attempted, 10);
        assert_eq!(result.lost, 5);
        assert_eq!(observer.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_fatal() {
        let mut config = quick_config(443, 3);
        config.host = "nowhere.invalid".to_string();

        let probe = TcpConnectProbe::new(config, Arc::new(StaticResolver::new()), quiet_logger());
        let err = probe.run(&NoopObserver).await.unwrap_err();
        assert_eq!(err.category(), "DNS");
    }

    #[tokio::test]
    async fn test_all_connects_refused() {
        // Bind then drop to get a port with nothing listening
        let (listener, port) = loopback_listener().await;
        drop(listener);

        let probe = TcpConnectProbe::new(quick_config(port, 3), Arc::new(StaticResolver::new()), quiet_logger());
        let err = probe.run(&NoopObserver).await.unwrap_err();
        assert_eq!(err.category(), "STATS");
    }
}
