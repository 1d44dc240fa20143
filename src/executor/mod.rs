//! Probe orchestration
//!
//! [`ProbeOrchestrator`] runs the configured probes strictly one after
//! another against a single host and gathers a [`ComparisonReport`]. It also
//! drives the endpoint sweep over the named endpoint table.
//!
//! A probe failure never aborts the run: it is logged, surfaced to the
//! observer and recorded as a [`ProbeFailure`].

use crate::{
    diagnostics::{InstanceMetadataClient, PathAnalyzer},
    dns::{timed_resolve, HostResolver},
    error::{AppError, Result},
    logging::ProbeLogger,
    models::{ComparisonReport, Config, ProbeFailure, ProbeResult, SweepEntry, SweepReport},
    persistence::ResultWriter,
    probe::{
        HttpPingConfig, HttpPingProbe, PingPongConfig, PingPongProbe, ProgressObserver, StreamEventConfig,
        StreamEventProbe, TcpConnectProbe, TcpConnector, TcpProbeConfig,
    },
    types::ProbeKind,
};
use std::sync::Arc;

/// Runs probes in sequence and collects their results
pub struct ProbeOrchestrator {
    config: Config,
    resolver: Arc<dyn HostResolver>,
    logger: ProbeLogger,
    observer: Arc<dyn ProgressObserver>,
    connector: Option<Arc<dyn TcpConnector>>,
    writer: Option<ResultWriter>,
    path_analyzer: PathAnalyzer,
    metadata_base_url: Option<String>,
}

impl ProbeOrchestrator {
    pub fn new(
        config: Config,
        resolver: Arc<dyn HostResolver>,
        logger: ProbeLogger,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let writer = config.output_dir.clone().map(ResultWriter::new);
        Self {
            config,
            resolver,
            logger,
            observer,
            connector: None,
            writer,
            path_analyzer: PathAnalyzer::default(),
            metadata_base_url: None,
        }
    }

    /// Use `connector` for every TCP probe
    pub fn with_connector(mut self, connector: Arc<dyn TcpConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_path_analyzer(mut self, analyzer: PathAnalyzer) -> Self {
        self.path_analyzer = analyzer;
        self
    }

    /// Query instance metadata from `base_url` instead of the link-local address
    pub fn with_metadata_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.metadata_base_url = Some(base_url.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run TCP, HTTP ping, WebSocket ping/pong and stream-event probes in order.
    ///
    /// Probes switched off in the configuration are skipped; the HTTP probe
    /// additionally needs an HTTP ping URL.
    pub async fn run_comparison(&self) -> Result<ComparisonReport> {
        let config = &self.config;
        if !(config.run_tcp || config.run_http || config.run_ping || config.run_stream) {
            return Err(AppError::config("Every probe is disabled; nothing to run"));
        }

        let mut report = ComparisonReport::new(config.host.clone());

        if config.run_tcp {
            let tcp_config = TcpProbeConfig::from_config(config);
            let target = format!("{}:{}", tcp_config.host, tcp_config.port);
            let outcome = self.tcp_probe(tcp_config).run(self.observer.as_ref()).await;
            self.record(&mut report, ProbeKind::TcpConnect, target, outcome).await;
        }

        if config.run_http {
            if let Some(url) = &config.http_ping_url {
                let probe = HttpPingProbe::new(HttpPingConfig::for_url(config, url), self.logger.clone());
                let outcome = probe.run(self.observer.as_ref()).await;
                self.record(&mut report, ProbeKind::HttpPing, url.clone(), outcome).await;
            }
        }

        if config.run_ping {
            let probe = PingPongProbe::new(PingPongConfig::from_config(config), self.logger.clone());
            let outcome = probe.run(self.observer.as_ref()).await;
            self.record(&mut report, ProbeKind::WsPingPong, config.ping_url.clone(), outcome)
                .await;
        }

        if config.run_stream {
            let stream_config = StreamEventConfig::from_config(config);
            let target = format!("{} [{}]", stream_config.url, stream_config.topic);
            let probe = StreamEventProbe::new(stream_config, self.logger.clone());
            let outcome = probe.run(Arc::clone(&self.observer)).await;
            self.record(&mut report, ProbeKind::StreamEvent, target, outcome).await;
        }

        Ok(report)
    }

    /// Resolve, TCP-probe and optionally HTTP-ping every named endpoint.
    ///
    /// Errors stay on the entry they belong to; the sweep always covers the
    /// whole endpoint table.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let config = &self.config;
        if config.endpoints.is_empty() {
            return Err(AppError::config("Endpoint table is empty"));
        }

        let mut report = SweepReport::new();

        if config.instance_metadata {
            report.instance = self.fetch_instance_metadata().await;
        }

        for (name, host) in &config.endpoints {
            let entry = self.sweep_endpoint(name, host).await;
            report.entries.push(entry);
        }

        if let Some(writer) = &self.writer {
            match writer.write_sweep(&report, "sweep") {
                Ok(path) => self.log_saved(&path.display().to_string()).await,
                Err(e) => self.log_persist_failure(&e).await,
            }
        }

        Ok(report)
    }

    async fn sweep_endpoint(&self, name: &str, host: &str) -> SweepEntry {
        let config = &self.config;
        let mut entry = SweepEntry::new(name, host);

        match timed_resolve(self.resolver.as_ref(), host).await {
            Ok(resolution) => {
                self.logger
                    .log_dns_resolution(
                        host,
                        resolution.addresses.len(),
                        resolution.duration.as_secs_f64() * 1000.0,
                    )
                    .await;
                entry.addresses = resolution.addresses;
            }
            Err(e) => {
                self.observer.on_warning(ProbeKind::TcpConnect, &format!("{}: {}", name, e));
                entry.errors.push(e.to_string());
                return entry;
            }
        }

        if config.run_tcp {
            match self.tcp_probe(TcpProbeConfig::for_host(config, host)).run(self.observer.as_ref()).await {
                Ok(result) => entry.tcp = Some(result.statistics),
                Err(e) => entry.errors.push(format!("tcp: {}", e)),
            }
        }

        if config.run_http {
            if let Some(url) = config.endpoint_ping_url(name) {
                let probe = HttpPingProbe::new(HttpPingConfig::for_url(config, &url), self.logger.clone());
                match probe.run(self.observer.as_ref()).await {
                    Ok(result) => entry.http = Some(result.statistics),
                    Err(e) => entry.errors.push(format!("http: {}", e)),
                }
            }
        }

        if config.path_analysis {
            let path = self.path_analyzer.analyze(host).await;
            entry.path_report = Some(path.render());
        }

        entry
    }

    async fn fetch_instance_metadata(&self) -> Option<crate::models::InstanceMetadata> {
        let client = match &self.metadata_base_url {
            Some(url) => InstanceMetadataClient::with_base_url(url.clone()),
            None => InstanceMetadataClient::new(),
        };

        match client {
            Ok(client) => match client.fetch().await {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    self.logger
                        .logger()
                        .warn(&format!("Instance metadata unavailable: {}", e))
                        .error_info(&e)
                        .log()
                        .await;
                    None
                }
            },
            Err(e) => {
                self.logger.logger().warn(&e.to_string()).error_info(&e).log().await;
                None
            }
        }
    }

    fn tcp_probe(&self, config: TcpProbeConfig) -> TcpConnectProbe {
        let probe = TcpConnectProbe::new(config, Arc::clone(&self.resolver), self.logger.clone());
        match &self.connector {
            Some(connector) => probe.with_connector(Arc::clone(connector)),
            None => probe,
        }
    }

    /// Keep a successful result (persisting it when configured) or note the failure
    async fn record(&self, report: &mut ComparisonReport, kind: ProbeKind, target: String, outcome: Result<ProbeResult>) {
        match outcome {
            Ok(result) => {
                if let Some(writer) = &self.writer {
                    match writer.write(&result, kind.slug()) {
                        Ok(path) => self.log_saved(&path.display().to_string()).await,
                        Err(e) => self.log_persist_failure(&e).await,
                    }
                }
                report.results.push(result);
            }
            Err(e) => {
                self.observer.on_warning(kind, &format!("{} probe failed: {}", kind, e));
                report.failures.push(ProbeFailure {
                    kind,
                    target,
                    category: e.category().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn log_saved(&self, path: &str) {
        self.logger
            .logger()
            .info(&format!("Results saved to {}", path))
            .field("path", path)
            .log()
            .await;
    }

    async fn log_persist_failure(&self, error: &AppError) {
        self.logger
            .logger()
            .error(&format!("Failed to save results: {}", error))
            .error_info(error)
            .log()
            .await;
    }
}
