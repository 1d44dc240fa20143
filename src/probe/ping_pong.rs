//! WebSocket ping/pong round-trip latency
//!
//! Pongs are matched to pings strictly by arrival order: the oldest
//! outstanding ping is credited with the next pong. This relies on the
//! transport delivering frames in order, which TCP-backed WebSockets do.

use super::websocket::{ConnectOptions, WsClient, WsEventHandler};
use super::{ProbePhase, ProgressObserver};
use crate::error::Result;
use crate::logging::ProbeLogger;
use crate::models::{Config, ProbeResult};
use crate::stats::StatisticsAccumulator;
use crate::types::ProbeKind;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parameters of a ping/pong probe
#[derive(Debug, Clone)]
pub struct PingPongConfig {
    /// Bare WebSocket endpoint; no subscriptions are made
    pub url: String,
    pub samples: usize,
    /// Requested cadence, raised to the exchange minimum if lower
    pub interval: Duration,
    pub warmup_pings: usize,
    pub warmup_interval: Duration,
    /// Wait after warmup for trailing pongs before resetting
    pub warmup_drain: Duration,
    /// Wait after measurement for trailing pongs before counting losses
    pub drain_grace: Duration,
}

impl PingPongConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            samples: crate::defaults::DEFAULT_PING_SAMPLES as usize,
            interval: crate::defaults::MIN_PING_INTERVAL,
            warmup_pings: crate::defaults::PING_WARMUP_COUNT,
            warmup_interval: crate::defaults::PING_WARMUP_INTERVAL,
            warmup_drain: crate::defaults::PONG_DRAIN_GRACE,
            drain_grace: crate::defaults::PONG_DRAIN_GRACE,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            samples: config.ping_samples as usize,
            interval: config.ping_interval(),
            ..Self::new(config.ping_url.clone())
        }
    }

    /// Interval actually used, never faster than the exchange allows
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(crate::defaults::MIN_PING_INTERVAL)
    }
}

/// What a pong was matched against
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PongOutcome {
    /// Round trip of the oldest outstanding ping, in milliseconds
    Matched(f64),
    /// Nothing was outstanding
    Stray,
}

#[derive(Debug, Default)]
struct TrackerState {
    accumulator: StatisticsAccumulator,
    pending: VecDeque<Instant>,
    sent: usize,
    stray: usize,
}

/// Samples and outstanding pings shared by the pacing loop and the socket task.
///
/// Every method takes the lock for a few instructions only; no caller holds
/// it across a send, a sleep or an await.
#[derive(Debug, Default)]
pub struct PingTracker {
    state: Mutex<TrackerState>,
}

/// Final counters taken from a tracker
#[derive(Debug)]
pub struct TrackerSnapshot {
    pub accumulator: StatisticsAccumulator,
    pub sent: usize,
    /// Pings still outstanding
    pub lost: usize,
    pub stray: usize,
}

impl PingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a ping about to be sent now.
    ///
    /// The timestamp is taken under the lock, so waiting for the socket
    /// task never counts towards the round trip.
    pub fn record_send(&self) {
        let mut state = self.state.lock();
        state.pending.push_back(Instant::now());
        state.sent += 1;
    }

    #[cfg(test)]
    pub(crate) fn record_send_at(&self, at: Instant) {
        let mut state = self.state.lock();
        state.pending.push_back(at);
        state.sent += 1;
    }

    /// Forget the most recent send after the frame failed to go out
    pub fn abandon_last_send(&self) {
        let mut state = self.state.lock();
        if state.pending.pop_back().is_some() {
            state.sent -= 1;
        }
    }

    /// Record a pong received now
    pub fn record_pong(&self) -> PongOutcome {
        self.record_pong_at(Instant::now())
    }

    pub fn record_pong_at(&self, at: Instant) -> PongOutcome {
        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(sent_at) => {
                let rtt_ms = at.saturating_duration_since(sent_at).as_secs_f64() * 1000.0;
                state.accumulator.add(rtt_ms);
                PongOutcome::Matched(rtt_ms)
            }
            None => {
                state.stray += 1;
                PongOutcome::Stray
            }
        }
    }

    /// Replace the accumulator and pending queue and zero the counters
    pub fn reset(&self) {
        *self.state.lock() = TrackerState::default();
    }

    pub fn sample_count(&self) -> usize {
        self.state.lock().accumulator.len()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn stray_count(&self) -> usize {
        self.state.lock().stray
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().sent
    }

    /// Take the collected samples, leaving an empty tracker
    pub fn take(&self) -> TrackerSnapshot {
        let state = std::mem::take(&mut *self.state.lock());
        TrackerSnapshot {
            accumulator: state.accumulator,
            sent: state.sent,
            lost: state.pending.len(),
            stray: state.stray,
        }
    }
}

struct PongHandler {
    tracker: Arc<PingTracker>,
}

impl WsEventHandler for PongHandler {
    fn on_pong(&self, received_at: Instant) {
        self.tracker.record_pong_at(received_at);
    }
}

/// Measures protocol-level ping/pong round trips over one connection
pub struct PingPongProbe {
    config: PingPongConfig,
    logger: ProbeLogger,
}

impl PingPongProbe {
    pub fn new(config: PingPongConfig, logger: ProbeLogger) -> Self {
        Self { config, logger }
    }

    /// Run the probe.
    ///
    /// Connection failure is fatal. A connection that drops mid-run ends the
    /// measurement early with whatever was collected.
    pub async fn run(self, observer: &dyn ProgressObserver) -> Result<ProbeResult> {
        let kind = ProbeKind::WsPingPong;
        let correlation_id = self.logger.log_probe_start(kind, &self.config.url).await;

        let interval = self.config.effective_interval();
        if interval != self.config.interval {
            self.logger
                .logger()
                .debug(&format!(
                    "Ping interval {:?} below rate limit, using {:?}",
                    self.config.interval, interval
                ))
                .log()
                .await;
        }

        let tracker = Arc::new(PingTracker::new());
        let handler = Arc::new(PongHandler {
            tracker: Arc::clone(&tracker),
        });

        observer.on_phase(kind, ProbePhase::Connecting);
        let client = WsClient::spawn(&self.config.url, handler, ConnectOptions::default());
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

        let result = self.measure(&client, &tracker, interval, observer).await;
        client.close().await;

        match &result {
            Ok(r) => self.logger.log_probe_complete(&correlation_id, r).await,
            Err(e) => self.logger.log_probe_failed(&correlation_id, kind, e).await,
        }
        result
    }

    async fn measure(
        &self,
        client: &WsClient,
        tracker: &PingTracker,
        interval: Duration,
        observer: &dyn ProgressObserver,
    ) -> Result<ProbeResult> {
        let kind = ProbeKind::WsPingPong;
        let target = self.config.samples;

        observer.on_phase(kind, ProbePhase::Warmup);
        for _ in 0..self.config.warmup_pings {
            if !self.ping(client, tracker).await {
                break;
            }
            tokio::time::sleep(self.config.warmup_interval).await;
        }
        tokio::time::sleep(self.config.warmup_drain).await;
        tracker.reset();

        observer.on_phase(kind, ProbePhase::Measuring);
        let started_at = Utc::now();
        // Bounds the run when the server stops answering
        let max_sends = target.saturating_mul(2).max(target + 10);
        let mut next_progress = crate::defaults::PING_PROGRESS_EVERY;

        while tracker.sample_count() < target && client.is_open() && tracker.sent_count() < max_sends {
            if !self.ping(client, tracker).await {
                break;
            }
            tokio::time::sleep(interval).await;

            let collected = tracker.sample_count();
            while collected >= next_progress {
                observer.on_progress(kind, next_progress, Some(target));
                next_progress += crate::defaults::PING_PROGRESS_EVERY;
            }
        }

        if !client.is_open() {
            observer.on_warning(kind, "connection dropped during measurement");
        }

        observer.on_phase(kind, ProbePhase::Draining);
        tokio::time::sleep(self.config.drain_grace).await;
        let snapshot = tracker.take();
        observer.on_phase(kind, ProbePhase::Finished);

        if snapshot.lost > 0 {
            let message = format!("{} of {} pings never received a pong", snapshot.lost, snapshot.sent);
            observer.on_warning(kind, &message);
            self.logger.log_anomaly(kind, &message, snapshot.lost).await;
        }
        if snapshot.stray > 0 {
            let message = format!("{} pongs arrived with no ping outstanding", snapshot.stray);
            self.logger.log_anomaly(kind, &message, snapshot.stray).await;
        }

        Ok(ProbeResult::from_accumulator(kind, self.config.url.clone(), snapshot.accumulator, started_at)?
            .with_attempted(snapshot.sent)
            .with_lost(snapshot.lost)
            .with_stray_pongs(snapshot.stray))
    }

    /// Record then send one ping; false when the connection should be treated as dropped
    async fn ping(&self, client: &WsClient, tracker: &PingTracker) -> bool {
        tracker.record_send();
        match client.send_ping(Vec::new()).await {
            Ok(()) => true,
            Err(e) => {
                tracker.abandon_last_send();
                self.logger
                    .log_sample_skipped(ProbeKind::WsPingPong, tracker.sent_count() + 1, &e.to_string())
                    .await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fifo_matching() {
        let tracker = PingTracker::new();
        let t0 = Instant::now();

        tracker.record_send_at(t0);
        tracker.record_send_at(t0 + Duration::from_millis(10));
        assert_eq!(tracker.pending_len(), 2);

        // First pong is credited to the first ping
        let first = tracker.record_pong_at(t0 + Duration::from_millis(30));
        assert!(matches!(first, PongOutcome::Matched(rtt) if (rtt - 30.0).abs() < 1e-9));
        let second = tracker.record_pong_at(t0 + Duration::from_millis(35));
        assert!(matches!(second, PongOutcome::Matched(rtt) if (rtt - 25.0).abs() < 1e-9));
        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(tracker.sample_count(), 2);
    }

    #[test]
    fn test_stray_pong_leaves_queue_untouched() {
        let tracker = PingTracker::new();
        assert_eq!(tracker.record_pong(), PongOutcome::Stray);
        assert_eq!(tracker.stray_count(), 1);
        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(tracker.sample_count(), 0);
    }

    #[test]
    fn test_reset_discards_warmup() {
        let tracker = PingTracker::new();
        for _ in 0..5 {
            tracker.record_send();
            tracker.record_pong();
        }
        tracker.record_send();
        tracker.reset();

        let t0 = Instant::now();
        for i in 0..3 {
            tracker.record_send_at(t0 + Duration::from_millis(i));
            tracker.record_pong_at(t0 + Duration::from_millis(i + 4));
        }

        let snapshot = tracker.take();
        assert_eq!(snapshot.accumulator.compute().unwrap().count, 3);
        assert_eq!(snapshot.sent, 3);
        assert_eq!(snapshot.lost, 0);
    }

    #[test]
    fn test_lost_pings_excluded_from_statistics() {
        let tracker = PingTracker::new();
        let t0 = Instant::now();
        for i in 0..4 {
            tracker.record_send_at(t0 + Duration::from_millis(i * 10));
        }
        tracker.record_pong_at(t0 + Duration::from_millis(5));
        tracker.record_pong_at(t0 + Duration::from_millis(15));

        let snapshot = tracker.take();
        assert_eq!(snapshot.lost, 2);
        assert_eq!(snapshot.accumulator.len(), 2);
        assert!(snapshot.accumulator.samples().iter().all(|rtt| (rtt - 5.0).abs() < 1e-9));
    }

    #[test]
    fn test_send_timestamp_excludes_lock_wait() {
        let tracker = Arc::new(PingTracker::new());
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();

        let holder = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                let _guard = tracker.state.lock();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(50));
            })
        };

        locked_rx.recv().unwrap();
        let waited = Instant::now();
        tracker.record_send();
        assert!(waited.elapsed() >= Duration::from_millis(40));

        match tracker.record_pong() {
            PongOutcome::Matched(rtt) => assert!(rtt < 10.0, "rtt {}", rtt),
            PongOutcome::Stray => panic!("pong should match the pending ping"),
        }
        holder.join().unwrap();
    }

    #[test]
    fn test_abandon_last_send() {
        let tracker = PingTracker::new();
        tracker.record_send();
        tracker.record_send();
        tracker.abandon_last_send();
        assert_eq!(tracker.pending_len(), 1);
        assert_eq!(tracker.sent_count(), 1);
    }

    #[test]
    fn test_interval_clamped_to_rate_limit() {
        let mut config = PingPongConfig::new("wss://stream.binance.com:9443/ws");
        config.interval = Duration::from_millis(50);
        assert_eq!(config.effective_interval(), Duration::from_millis(200));

        config.interval = Duration::from_millis(500);
        assert_eq!(config.effective_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_concurrent_send_and_pong() {
        let tracker = Arc::new(PingTracker::new());
        let total = 2_000;

        let sender = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                for _ in 0..total {
                    tracker.record_send();
                }
            })
        };
        let receiver = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                let mut matched = 0;
                while matched < total {
                    if let PongOutcome::Matched(_) = tracker.record_pong() {
                        matched += 1;
                    }
                }
            })
        };
        sender.join().unwrap();
        receiver.join().unwrap();

        assert_eq!(tracker.sample_count(), total);
        assert_eq!(tracker.pending_len(), 0);
    }

    #[derive(Debug, Clone)]
    enum Event {
        Send(u64),
        Pong(u64),
    }

    fn interleavings() -> impl Strategy<Value = Vec<Event>> {
        proptest::collection::vec(
            prop_oneof![(0u64..50).prop_map(Event::Send), (0u64..50).prop_map(Event::Pong)],
            1..200,
        )
    }

    proptest! {
        /// The i-th matched pong is always credited to the i-th send
        #[test]
        fn fifo_under_fuzzed_interleavings(events in interleavings()) {
            let tracker = PingTracker::new();
            let base = Instant::now();
            let mut clock = 0u64;
            let mut sends: Vec<u64> = Vec::new();
            let mut matched: Vec<f64> = Vec::new();
            let mut expected_stray = 0;

            for event in events {
                match event {
                    Event::Send(gap) => {
                        clock += gap;
                        tracker.record_send_at(base + Duration::from_millis(clock));
                        sends.push(clock);
                    }
                    Event::Pong(gap) => {
                        clock += gap;
                        let pending_before = tracker.pending_len();
                        match tracker.record_pong_at(base + Duration::from_millis(clock)) {
                            PongOutcome::Matched(rtt) => {
                                let sent = sends[matched.len()];
                                prop_assert!((rtt - (clock - sent) as f64).abs() < 1e-6);
                                matched.push(rtt);
                            }
                            PongOutcome::Stray => {
                                prop_assert_eq!(pending_before, 0);
                                prop_assert_eq!(tracker.pending_len(), 0);
                                expected_stray += 1;
                            }
                        }
                    }
                }
            }

            let snapshot = tracker.take();
            prop_assert_eq!(snapshot.accumulator.samples(), matched.as_slice());
            prop_assert_eq!(snapshot.lost, sends.len() - matched.len());
            prop_assert_eq!(snapshot.stray, expected_stray);
        }
    }
}
