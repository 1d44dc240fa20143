//! End-to-end probe runs against local servers

use async_trait::async_trait;
use chrono::Utc;
use exchange_latency_probe::{
    dns::StaticResolver,
    logging::{Logger, ProbeLogger},
    probe::{
        PingPongConfig, PingPongProbe, RecordingObserver, StreamEventConfig, StreamEventProbe, TcpConnectProbe,
        TcpConnector, TcpProbeConfig,
    },
    types::ProbeKind,
};
use futures::{SinkExt, StreamExt};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn logger() -> ProbeLogger {
    ProbeLogger::from_logger(Logger::silent("TEST"))
}

/// Loopback connector that adds a fixed delay before each handshake
struct DelayedConnector {
    delay: Duration,
}

#[async_trait]
impl TcpConnector for DelayedConnector {
    async fn connect(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
        tokio::time::sleep(self.delay).await;
        TcpStream::connect(addr).await
    }
}

async fn accepting_listener() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    port
}

#[tokio::test]
async fn tcp_probe_measures_handshake_delay() {
    let port = accepting_listener().await;
    let resolver = Arc::new(StaticResolver::new().with_host("exchange.test", vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]));
    let config = TcpProbeConfig {
        samples: 50,
        interval: Duration::from_millis(1),
        warmup_count: 2,
        warmup_interval: Duration::from_millis(1),
        ..TcpProbeConfig::new("exchange.test", port)
    };

    let observer = RecordingObserver::new();
    let result = TcpConnectProbe::new(config, resolver, logger())
        .with_connector(Arc::new(DelayedConnector {
            delay: Duration::from_millis(10),
        }))
        .run(&observer)
        .await
        .unwrap();

    assert_eq!(result.kind, ProbeKind::TcpConnect);
    assert_eq!(result.statistics.count, 50);
    assert_eq!(result.lost, 0);
    // Handshake time is the connector delay plus a small loopback cost
    assert!(result.statistics.min >= 10.0, "min {}", result.statistics.min);
    assert!(result.statistics.max < 25.0, "max {}", result.statistics.max);
    assert!((10.0..15.0).contains(&result.statistics.mean), "mean {}", result.statistics.mean);
    assert!(result.statistics.p50 <= result.statistics.p99);
    assert_eq!(observer.progress().len(), 5);
}

/// Answers every ping with an explicit pong after `delay`
async fn delayed_pong_server(delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(socket).await else { return };
                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Ping(payload) => {
                            tokio::time::sleep(delay).await;
                            if ws.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });
    format!("ws://{}", addr)
}

#[tokio::test]
async fn ping_pong_probe_matches_server_delay() {
    let url = delayed_pong_server(Duration::from_millis(30)).await;
    let config = PingPongConfig {
        samples: 20,
        interval: Duration::from_millis(200),
        warmup_pings: 2,
        warmup_interval: Duration::from_millis(50),
        warmup_drain: Duration::from_millis(200),
        drain_grace: Duration::from_millis(500),
        ..PingPongConfig::new(url)
    };

    let observer = RecordingObserver::new();
    let result = PingPongProbe::new(config, logger()).run(&observer).await.unwrap();

    assert_eq!(result.kind, ProbeKind::WsPingPong);
    assert_eq!(result.statistics.count, 20);
    assert_eq!(result.lost, 0);
    assert_eq!(result.stray_pongs, 0);
    // Server delay is 30ms; allow a few ms of scheduler jitter either way
    for sample in &result.samples {
        assert!((25.0..=40.0).contains(sample), "sample {}", sample);
    }
    assert!((29.0..35.0).contains(&result.statistics.mean), "mean {}", result.statistics.mean);
}

#[tokio::test]
async fn ping_pong_probe_fails_without_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let observer = RecordingObserver::new();
    let result = PingPongProbe::new(PingPongConfig::new(format!("ws://{}", addr)), logger())
        .run(&observer)
        .await;
    assert!(result.is_err());
}

/// Sends a stale event during warmup, then fresh events and one malformed frame
async fn event_server(warmup: Duration, fresh_events: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else { return };
        let Ok(mut ws) = accept_async(socket).await else { return };

        // Subscription request
        if !matches!(ws.next().await, Some(Ok(Message::Text(_)))) {
            return;
        }
        let _ = ws.send(Message::Text(r#"{"result":null,"id":1}"#.to_string())).await;

        let stale = Utc::now().timestamp_millis() - 10_000;
        let _ = ws.send(Message::Text(format!(r#"{{"e":"trade","E":{}}}"#, stale))).await;

        tokio::time::sleep(warmup * 2).await;
        for _ in 0..fresh_events {
            let now = Utc::now().timestamp_millis();
            let _ = ws.send(Message::Text(format!(r#"{{"e":"trade","E":{}}}"#, now))).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let _ = ws.send(Message::Text("not json".to_string())).await;

        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });
    format!("ws://{}", addr)
}

#[tokio::test]
async fn stream_probe_discards_warmup_events() {
    let warmup = Duration::from_millis(300);
    let url = event_server(warmup, 5).await;
    let config = StreamEventConfig {
        warmup,
        duration: Duration::from_secs(2),
        ..StreamEventConfig::new(url, "btcusdt@trade")
    };

    let observer = Arc::new(RecordingObserver::new());
    let result = StreamEventProbe::new(config, logger()).run(observer.clone()).await.unwrap();

    assert_eq!(result.kind, ProbeKind::StreamEvent);
    assert_eq!(result.statistics.count, 5);
    assert_eq!(result.malformed_messages, 1);
    assert!(!result.clock_skew_warning);
    // The stale warmup event would have been ~10s
    assert!(result.statistics.max < 1_000.0, "max {}", result.statistics.max);
    assert!(result.statistics.mean.abs() < 100.0, "mean {}", result.statistics.mean);
    assert!(observer.warnings().is_empty());
}
