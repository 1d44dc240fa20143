//! WebSocket transport shared by the ping/pong and stream probes
//!
//! A background tokio task owns the read half of the connection and invokes
//! [`WsEventHandler`] callbacks. The foreground holds a [`WsClient`] and
//! sends through the write half, which sits behind an async mutex.

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// How long `close` waits for the socket task before aborting it
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Callbacks delivered from the socket task.
///
/// Callbacks run on the task that reads the socket; they must return quickly
/// and must not send traffic.
pub trait WsEventHandler: Send + Sync + 'static {
    fn on_open(&self) {}

    /// A text frame, stamped with the wall-clock receive time
    fn on_message(&self, _text: &str, _received_at: DateTime<Utc>) {}

    /// A pong frame, stamped with the monotonic receive time
    fn on_pong(&self, _received_at: Instant) {}

    fn on_error(&self, _error: &AppError) {}

    fn on_close(&self) {}
}

/// Connection behaviour
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Automatic ping period; `None` sends no pings of our own
    pub keepalive: Option<Duration>,
    /// Text frame sent once right after the handshake
    pub on_open_text: Option<String>,
    pub disable_nagle: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            keepalive: None,
            on_open_text: None,
            disable_nagle: true,
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    open: AtomicBool,
    closed: AtomicBool,
    last_error: parking_lot::Mutex<Option<String>>,
}

impl ConnectionState {
    fn fail(&self, error: &AppError) {
        *self.last_error.lock() = Some(error.to_string());
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Handle to a WebSocket connection driven by a background task
pub struct WsClient {
    url: String,
    sink: Arc<tokio::sync::Mutex<Option<WsSink>>>,
    state: Arc<ConnectionState>,
    task: JoinHandle<()>,
}

impl WsClient {
    /// Start connecting to `url` in the background
    pub fn spawn(url: &str, handler: Arc<dyn WsEventHandler>, options: ConnectOptions) -> Self {
        let sink = Arc::new(tokio::sync::Mutex::new(None));
        let state = Arc::new(ConnectionState::default());

        let task = tokio::spawn(drive(
            url.to_string(),
            handler,
            options,
            Arc::clone(&sink),
            Arc::clone(&state),
        ));

        Self {
            url: url.to_string(),
            sink,
            state,
            task,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Poll every `poll` until the connection is open, for at most `timeout`
    pub async fn wait_open(&self, timeout: Duration, poll: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_open() {
                return Ok(());
            }
            if self.is_closed() {
                let reason = self
                    .state
                    .last_error
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "closed before open".to_string());
                return Err(AppError::network(format!("WebSocket connection to {} failed: {}", self.url, reason)));
            }
            if Instant::now() >= deadline {
                return Err(AppError::timeout(format!(
                    "WebSocket connection to {} not open after {:?}",
                    self.url, timeout
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Send a protocol-level ping
    pub async fn send_ping(&self, payload: Vec<u8>) -> Result<()> {
        self.send(Message::Ping(payload)).await
    }

    /// Send a text frame
    pub async fn send_text(&self, text: String) -> Result<()> {
        self.send(Message::Text(text)).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink.send(message).await.map_err(AppError::from),
            None => Err(AppError::websocket(format!("connection to {} is not open", self.url))),
        }
    }

    /// Close the connection and wait briefly for the socket task to finish
    pub async fn close(mut self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        if tokio::time::timeout(CLOSE_GRACE, &mut self.task).await.is_err() {
            self.task.abort();
        }
        self.state.mark_closed();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive(
    url: String,
    handler: Arc<dyn WsEventHandler>,
    options: ConnectOptions,
    sink_slot: Arc<tokio::sync::Mutex<Option<WsSink>>>,
    state: Arc<ConnectionState>,
) {
    let stream = match connect(&url, options.disable_nagle).await {
        Ok(stream) => stream,
        Err(e) => {
            state.fail(&e);
            handler.on_error(&e);
            state.mark_closed();
            handler.on_close();
            return;
        }
    };

    let (mut write, mut read) = stream.split();

    if let Some(text) = options.on_open_text {
        if let Err(e) = write.send(Message::Text(text)).await {
            let e = AppError::from(e);
            state.fail(&e);
            handler.on_error(&e);
            state.mark_closed();
            handler.on_close();
            return;
        }
    }

    *sink_slot.lock().await = Some(write);
    state.open.store(true, Ordering::SeqCst);
    handler.on_open();

    let mut keepalive = options
        .keepalive
        .map(|period| tokio::time::interval_at(tokio::time::Instant::now() + period, period));

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => handler.on_message(&text, Utc::now()),
                Some(Ok(Message::Binary(bytes))) => {
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        handler.on_message(text, Utc::now());
                    }
                }
                Some(Ok(Message::Pong(_))) => handler.on_pong(Instant::now()),
                // tungstenite queues the pong reply itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    let e = AppError::from(e);
                    state.fail(&e);
                    handler.on_error(&e);
                    break;
                }
            },
            _ = next_keepalive(&mut keepalive) => {
                let mut guard = sink_slot.lock().await;
                if let Some(sink) = guard.as_mut() {
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        let e = AppError::from(e);
                        state.fail(&e);
                        handler.on_error(&e);
                        break;
                    }
                }
            }
        }
    }

    state.mark_closed();
    handler.on_close();
}

async fn connect(url: &str, disable_nagle: bool) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let request = url.into_client_request()?;

    let ws_config = WebSocketConfig {
        max_message_size: Some(16 * 1024 * 1024),
        max_frame_size: Some(4 * 1024 * 1024),
        accept_unmasked_frames: false,
        ..Default::default()
    };

    let (stream, _response) = connect_async_with_config(request, Some(ws_config), disable_nagle).await?;
    Ok(stream)
}

async fn next_keepalive(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
