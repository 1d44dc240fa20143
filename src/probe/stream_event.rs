//! Event-time latency on a subscribed stream
//!
//! Latency is local wall-clock receive time minus the producer's event time
//! `E`, so it is only as good as clock synchronisation between both hosts.

use super::websocket::{ConnectOptions, WsClient, WsEventHandler};
use super::{ProbePhase, ProgressObserver};
use crate::error::Result;
use crate::logging::ProbeLogger;
use crate::models::{Config, ProbeResult};
use crate::stats::StatisticsAccumulator;
use crate::types::ProbeKind;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency below which a clock-sync warning is raised
pub const CLOCK_SKEW_THRESHOLD_MS: f64 = -100.0;

/// Parameters of a stream event probe
#[derive(Debug, Clone)]
pub struct StreamEventConfig {
    pub url: String,
    /// Stream name, e.g. `btcusdt@trade`
    pub topic: String,
    /// Messages during this window are not recorded
    pub warmup: Duration,
    /// Measurement window after warmup
    pub duration: Duration,
}

impl StreamEventConfig {
    pub fn new(url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            topic: topic.into(),
            warmup: crate::defaults::DEFAULT_STREAM_WARMUP,
            duration: crate::defaults::DEFAULT_STREAM_DURATION,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            warmup: config.stream_warmup(),
            duration: config.stream_duration(),
            ..Self::new(config.stream_url.clone(), config.topic.clone())
        }
    }

    /// Subscription control message sent once on open
    pub fn subscribe_message(&self) -> String {
        serde_json::json!({
            "method": "SUBSCRIBE",
            "params": [self.topic],
            "id": 1,
        })
        .to_string()
    }
}

#[derive(Debug)]
struct SamplerState {
    warming: bool,
    accumulator: StatisticsAccumulator,
    malformed: usize,
}

/// Turns stream messages into latency samples.
///
/// Shared between the socket task, which feeds it, and the probe, which
/// ends the warmup and collects the result.
pub struct EventSampler {
    state: Mutex<SamplerState>,
    skew_warned: AtomicBool,
    observer: Arc<dyn ProgressObserver>,
}

/// Final counters taken from a sampler
#[derive(Debug)]
pub struct SamplerSnapshot {
    pub accumulator: StatisticsAccumulator,
    pub malformed: usize,
    pub clock_skew_warning: bool,
}

impl EventSampler {
    pub fn new(observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            state: Mutex::new(SamplerState {
                warming: true,
                accumulator: StatisticsAccumulator::new(),
                malformed: 0,
            }),
            skew_warned: AtomicBool::new(false),
            observer,
        }
    }

    /// Handle one message; returns the recorded latency, if any
    pub fn observe(&self, text: &str, received_at: DateTime<Utc>) -> Option<f64> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => {
                self.state.lock().malformed += 1;
                return None;
            }
        };

        let event_ms = event_time(&value)?;
        let latency = received_at.timestamp_micros() as f64 / 1000.0 - event_ms as f64;

        let recorded = {
            let mut state = self.state.lock();
            if state.warming {
                return None;
            }
            state.accumulator.add(latency);
            state.accumulator.len()
        };

        if latency < CLOCK_SKEW_THRESHOLD_MS && !self.skew_warned.swap(true, Ordering::SeqCst) {
            self.observer.on_warning(
                ProbeKind::StreamEvent,
                &format!(
                    "event latency of {:.1}ms is negative; local clock is likely out of sync (check NTP/chrony)",
                    latency
                ),
            );
        }

        if recorded % crate::defaults::STREAM_PROGRESS_EVERY == 0 {
            self.observer.on_progress(ProbeKind::StreamEvent, recorded, None);
        }

        Some(latency)
    }

    /// Start recording into a fresh accumulator
    pub fn end_warmup(&self) {
        let mut state = self.state.lock();
        state.accumulator = StatisticsAccumulator::new();
        state.warming = false;
    }

    pub fn is_warming(&self) -> bool {
        self.state.lock().warming
    }

    pub fn sample_count(&self) -> usize {
        self.state.lock().accumulator.len()
    }

    /// Take the collected samples, leaving an empty accumulator
    pub fn take(&self) -> SamplerSnapshot {
        let mut state = self.state.lock();
        SamplerSnapshot {
            accumulator: std::mem::take(&mut state.accumulator),
            malformed: state.malformed,
            clock_skew_warning: self.skew_warned.load(Ordering::SeqCst),
        }
    }
}

/// Event time in ms, from a bare payload or a combined-stream envelope
fn event_time(value: &Value) -> Option<i64> {
    value
        .get("E")
        .or_else(|| value.get("data").and_then(|data| data.get("E")))
        .and_then(Value::as_i64)
}

struct StreamHandler {
    sampler: Arc<EventSampler>,
}

impl WsEventHandler for StreamHandler {
    fn on_message(&self, text: &str, received_at: DateTime<Utc>) {
        self.sampler.observe(text, received_at);
    }
}

/// Passive event-time latency probe
pub struct StreamEventProbe {
    config: StreamEventConfig,
    logger: ProbeLogger,
}

impl StreamEventProbe {
    pub fn new(config: StreamEventConfig, logger: ProbeLogger) -> Self {
        Self { config, logger }
    }

    /// Run the probe for warmup plus duration, or until the connection drops
    pub async fn run(self, observer: Arc<dyn ProgressObserver>) -> Result<ProbeResult> {
        let kind = ProbeKind::StreamEvent;
        let target = format!("{} [{}]", self.config.url, self.config.topic);
        let correlation_id = self.logger.log_probe_start(kind, &target).await;

        let sampler = Arc::new(EventSampler::new(Arc::clone(&observer)));
        let handler = Arc::new(StreamHandler {
            sampler: Arc::clone(&sampler),
        });
        let options = ConnectOptions {
            on_open_text: Some(self.config.subscribe_message()),
            ..Default::default()
        };

        observer.on_phase(kind, ProbePhase::Connecting);
        let client = WsClient::spawn(&self.config.url, handler, options);
        if let Err(e) = client
            .wait_open(crate::defaults::WS_OPEN_TIMEOUT, crate::defaults::WS_OPEN_POLL)
            .await
        {
            client.close().await;
            self.logger.log_connection(&self.config.url, false, Some(&e.to_string())).await;
            self.logger.log_probe_failed(&correlation_id, kind, &e).await;
            return Err(e);
        }
        self.logger.log_connection(&self.config.url, true, None).await;

        observer.on_phase(kind, ProbePhase::Warmup);
        wait_while_open(&client, self.config.warmup).await;
        sampler.end_warmup();

        observer.on_phase(kind, ProbePhase::Measuring);
        let started_at = Utc::now();
        wait_while_open(&client, self.config.duration).await;

        if !client.is_open() {
            observer.on_warning(kind, "connection dropped during measurement");
        }
        client.close().await;
        observer.on_phase(kind, ProbePhase::Finished);

        let snapshot = sampler.take();
        if snapshot.malformed > 0 {
            self.logger
                .log_anomaly(kind, &format!("{} malformed messages dropped", snapshot.malformed), snapshot.malformed)
                .await;
        }
        if snapshot.clock_skew_warning {
            self.logger
                .log_anomaly(kind, "Large negative event latency observed; check clock synchronisation", 1)
                .await;
        }

        let result = ProbeResult::from_accumulator(kind, target, snapshot.accumulator, started_at).map(|r| {
            r.with_malformed_messages(snapshot.malformed)
                .with_clock_skew_warning(snapshot.clock_skew_warning)
        });

        match &result {
            Ok(r) => self.logger.log_probe_complete(&correlation_id, r).await,
            Err(e) => self.logger.log_probe_failed(&correlation_id, kind, e).await,
        }
        result
    }
}

/// Sleep for `window`, returning early if the connection closes
async fn wait_while_open(client: &WsClient, window: Duration) {
    let deadline = Instant::now() + window;
    let step = Duration::from_millis(100);
    while client.is_open() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(step.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::RecordingObserver;

    fn sampler() -> (Arc<RecordingObserver>, EventSampler) {
        let observer = Arc::new(RecordingObserver::new());
        let sampler = EventSampler::new(observer.clone());
        (observer, sampler)
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_subscribe_message() {
        let config = StreamEventConfig::new("wss://stream.binance.com:9443/ws", "btcusdt@trade");
        let value: Value = serde_json::from_str(&config.subscribe_message()).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["params"][0], "btcusdt@trade");
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn test_warmup_messages_not_recorded() {
        let (_, sampler) = sampler();
        assert!(sampler.observe(r#"{"e":"trade","E":1000}"#, at_ms(1500)).is_none());
        assert!(sampler.is_warming());

        sampler.end_warmup();
        let latency = sampler.observe(r#"{"e":"trade","E":2000}"#, at_ms(2007)).unwrap();
        assert!((latency - 7.0).abs() < 1e-9);

        let snapshot = sampler.take();
        assert_eq!(snapshot.accumulator.len(), 1);
    }

    #[test]
    fn test_malformed_and_eventless_messages() {
        let (_, sampler) = sampler();
        sampler.end_warmup();

        assert!(sampler.observe("not json", at_ms(0)).is_none());
        // Subscription acks carry no event time
        assert!(sampler.observe(r#"{"result":null,"id":1}"#, at_ms(0)).is_none());

        let snapshot = sampler.take();
        assert_eq!(snapshot.malformed, 1);
        assert!(snapshot.accumulator.is_empty());
    }

    #[test]
    fn test_combined_stream_envelope() {
        let (_, sampler) = sampler();
        sampler.end_warmup();
        let text = r#"{"stream":"btcusdt@trade","data":{"e":"trade","E":5000}}"#;
        let latency = sampler.observe(text, at_ms(5003)).unwrap();
        assert!((latency - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clock_skew_warned_once() {
        let (observer, sampler) = sampler();
        sampler.end_warmup();

        sampler.observe(r#"{"E":10000}"#, at_ms(9000));
        sampler.observe(r#"{"E":10000}"#, at_ms(8000));
        sampler.observe(r#"{"E":10000}"#, at_ms(9990));

        let warnings = observer.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].0, ProbeKind::StreamEvent);

        let snapshot = sampler.take();
        assert!(snapshot.clock_skew_warning);
        // Skewed samples are kept as-is
        assert_eq!(snapshot.accumulator.len(), 3);
        assert!((snapshot.accumulator.samples()[1] + 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_every_500() {
        let (observer, sampler) = sampler();
        sampler.end_warmup();
        for i in 0..1000 {
            sampler.observe(&format!(r#"{{"E":{}}}"#, i), at_ms(i + 1));
        }
        let progress: Vec<usize> = observer.progress().into_iter().map(|(_, n)| n).collect();
        assert_eq!(progress, vec![500, 1000]);
    }

    #[test]
    fn test_config_from_app_config() {
        let app = Config {
            topic: "ethusdt@trade".to_string(),
            stream_warmup_secs: 2,
            stream_duration_secs: 30,
            ..Default::default()
        };
        let config = StreamEventConfig::from_config(&app);
        assert_eq!(config.topic, "ethusdt@trade");
        assert_eq!(config.warmup, Duration::from_secs(2));
        assert_eq!(config.duration, Duration::from_secs(30));
    }
}
