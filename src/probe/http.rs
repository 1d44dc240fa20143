//! REST ping latency over a pooled HTTP client

use super::{ProbePhase, ProgressObserver};
use crate::error::{AppError, Result};
use crate::logging::ProbeLogger;
use crate::models::{Config, ProbeResult};
use crate::stats::StatisticsAccumulator;
use crate::types::ProbeKind;
use chrono::Utc;
use reqwest::Client;
use std::time::{Duration, Instant};

/// Parameters of an HTTP ping probe
#[derive(Debug, Clone)]
pub struct HttpPingConfig {
    pub url: String,
    pub samples: usize,
    pub interval: Duration,
    pub timeout: Duration,
}

impl HttpPingConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            samples: crate::defaults::DEFAULT_HTTP_SAMPLES as usize,
            interval: crate::defaults::DEFAULT_TCP_INTERVAL,
            timeout: crate::defaults::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Probe parameters for `url` using the configured pacing
    pub fn for_url(config: &Config, url: &str) -> Self {
        Self {
            samples: config.http_samples as usize,
            interval: config.tcp_interval(),
            timeout: config.connect_timeout(),
            ..Self::new(url)
        }
    }
}

/// Measures full request round trips against a lightweight ping route.
///
/// One unmeasured request first primes the connection pool so samples
/// exclude the TCP and TLS handshakes.
pub struct HttpPingProbe {
    config: HttpPingConfig,
    logger: ProbeLogger,
}

impl HttpPingProbe {
    pub fn new(config: HttpPingConfig, logger: ProbeLogger) -> Self {
        Self { config, logger }
    }

    pub async fn run(self, observer: &dyn ProgressObserver) -> Result<ProbeResult> {
        let kind = ProbeKind::HttpPing;
        let correlation_id = self.logger.log_probe_start(kind, &self.config.url).await;

        let result = self.measure(observer).await;
        match &result {
            Ok(r) => self.logger.log_probe_complete(&correlation_id, r).await,
            Err(e) => self.logger.log_probe_failed(&correlation_id, kind, e).await,
        }
        result
    }

    async fn measure(&self, observer: &dyn ProgressObserver) -> Result<ProbeResult> {
        let kind = ProbeKind::HttpPing;
        url::Url::parse(&self.config.url)?;

        let client = Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(1)
            .tcp_nodelay(true)
            .user_agent(format!("{}/{}", crate::PKG_NAME, crate::VERSION))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        observer.on_phase(kind, ProbePhase::Warmup);
        if let Err(e) = self.ping_once(&client).await {
            self.logger.logger().debug(&format!("Warmup request failed: {}", e)).log().await;
        }

        observer.on_phase(kind, ProbePhase::Measuring);
        let started_at = Utc::now();
        let mut accumulator = StatisticsAccumulator::with_capacity(self.config.samples);
        let mut skipped = 0;

        for attempt in 1..=self.config.samples {
            match self.ping_once(&client).await {
                Ok(elapsed) => accumulator.add(elapsed.as_secs_f64() * 1000.0),
                Err(e) => {
                    skipped += 1;
                    self.logger.log_sample_skipped(kind, attempt, &e.to_string()).await;
                }
            }
            tokio::time::sleep(self.config.interval).await;
        }
        observer.on_phase(kind, ProbePhase::Finished);

        if skipped > 0 {
            observer.on_warning(kind, &format!("{} of {} requests failed", skipped, self.config.samples));
        }

        Ok(
            ProbeResult::from_accumulator(kind, self.config.url.clone(), accumulator, started_at)?
                .with_attempted(self.config.samples)
                .with_lost(skipped),
        )
    }

    /// One request, timed until the body has been read
    async fn ping_once(&self, client: &Client) -> Result<Duration> {
        let start = Instant::now();
        let response = client.get(&self.config.url).send().await?;
        let status = response.status();
        response.bytes().await?;
        let elapsed = start.elapsed();

        if !status.is_success() {
            return Err(AppError::http_request(format!("{} returned {}", self.config.url, status)));
        }
        Ok(elapsed)
    }
}
