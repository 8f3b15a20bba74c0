//! Streaming session state machine and receive loop.
//!
//! ```text
//! Disconnected ──connect──▶ Connected ◀──stop_streaming── Streaming
//!      ▲                        │                             ▲
//!      │                        └──────start_streaming────────┘
//!      └──── disconnect (any state) / transport closed or failed
//! ```
//!
//! Each successful connect spawns one receive loop task. The loop awaits
//! every consumer callback before reading the next message, so at most one
//! callback is in flight and callbacks observe messages in arrival order.
//! Disconnecting cancels the loop cooperatively through a per-connection
//! [`CancellationToken`]; a connection generation counter keeps a stale
//! loop from touching the state of a newer connection.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::streaming::message::{parse_inbound, InboundMessage, OutboundMessage};
use crate::streaming::transport::{
    InboundFrame, StreamConnector, StreamReceiver, StreamSender, WebSocketConnector,
};
use crate::errors::panic_message;
use crate::{AppError, Result};

/// Consumer invoked with a frame or audio payload.
pub type StreamCallback = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Connection state of a [`StreamingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// No transport open.
    Disconnected,
    /// Transport open, not streaming.
    Connected,
    /// Transport open and a start message has been sent.
    Streaming,
}

/// Point-in-time view of the streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    /// Current state.
    pub state: StreamState,
    /// `true` in `Connected` and `Streaming`.
    pub is_connected: bool,
    /// `true` in `Streaming`.
    pub is_streaming: bool,
    /// Streaming host.
    pub host: String,
    /// Streaming port.
    pub port: u16,
    /// HTTP base URL of the streaming service.
    pub base_url: String,
    /// Browser client URL.
    pub stream_url: String,
}

struct Link {
    state: StreamState,
    generation: u64,
    cancel: Option<CancellationToken>,
}

#[derive(Default)]
struct Consumers {
    frame: Option<StreamCallback>,
    audio: Option<StreamCallback>,
}

type SenderSlot = Arc<tokio::sync::Mutex<Option<Box<dyn StreamSender>>>>;

/// Persistent data-plane session.
pub struct StreamingSession {
    host: String,
    port: u16,
    base_url: String,
    endpoint: String,
    client_url: String,
    format: String,
    strict_start: bool,
    connector: Arc<dyn StreamConnector>,
    link: Arc<Mutex<Link>>,
    sender: SenderSlot,
    consumers: Arc<Mutex<Consumers>>,
    receive_task: Option<JoinHandle<()>>,
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamingSession {
    /// Create a WebSocket-backed session for `ws://{host}:{webrtc_port}{path}`.
    #[must_use]
    pub fn new(config: &GlobalConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    /// Create a session that opens connections through `connector`.
    #[must_use]
    pub fn with_connector(config: &GlobalConfig, connector: Arc<dyn StreamConnector>) -> Self {
        let base_url = format!("http://{}:{}", config.host, config.webrtc_port);
        let endpoint = format!(
            "ws://{}:{}{}",
            config.host, config.webrtc_port, config.streaming.path
        );
        let client_url = format!("{base_url}{}", config.streaming.client_path);
        info!(base_url, endpoint, "streaming session configured");

        Self {
            host: config.host.clone(),
            port: config.webrtc_port,
            base_url,
            endpoint,
            client_url,
            format: config.streaming.format.clone(),
            strict_start: config.streaming.strict_start,
            connector,
            link: Arc::new(Mutex::new(Link {
                state: StreamState::Disconnected,
                generation: 0,
                cancel: None,
            })),
            sender: Arc::new(tokio::sync::Mutex::new(None)),
            consumers: Arc::new(Mutex::new(Consumers::default())),
            receive_task: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.link.lock().state
    }

    /// `true` in `Connected` and `Streaming`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() != StreamState::Disconnected
    }

    /// `true` in `Streaming`.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// WebSocket endpoint the session connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// URL of the browser streaming client.
    #[must_use]
    pub fn stream_url(&self) -> &str {
        &self.client_url
    }

    /// Open the transport and start the receive loop.
    ///
    /// Returns `true` when connected afterwards, including when it already
    /// was. A failed attempt leaves the session `Disconnected`.
    pub async fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }

        info!(endpoint = self.endpoint, "connecting to streaming service");
        let parts = match self.connector.connect(&self.endpoint).await {
            Ok(parts) => parts,
            Err(err) => {
                error!(endpoint = self.endpoint, %err, "failed to connect to streaming service");
                return false;
            }
        };

        let cancel = CancellationToken::new();
        let generation = {
            let mut slot = self.sender.lock().await;
            *slot = Some(parts.sender);
            let mut link = self.link.lock();
            link.generation += 1;
            link.state = StreamState::Connected;
            link.cancel = Some(cancel.clone());
            link.generation
        };

        let receive_loop = ReceiveLoop {
            link: Arc::clone(&self.link),
            sender: Arc::clone(&self.sender),
            consumers: Arc::clone(&self.consumers),
            generation,
            cancel,
        };
        let span = info_span!("stream_receive", endpoint = self.endpoint, generation);
        self.receive_task = Some(tokio::spawn(receive_loop.run(parts.receiver).instrument(span)));

        info!(endpoint = self.endpoint, "streaming connection established");
        true
    }

    /// Close the transport and return to `Disconnected` from any state.
    pub async fn disconnect(&mut self) {
        let cancel = {
            let mut link = self.link.lock();
            link.generation += 1;
            link.state = StreamState::Disconnected;
            link.cancel.take()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let sender = self.sender.lock().await.take();
        if let Some(mut sender) = sender {
            if let Err(err) = sender.close().await {
                warn!(%err, "error closing streaming connection");
            }
        }

        // The loop observes the cancellation at its next read and exits.
        self.receive_task.take();
        info!(endpoint = self.endpoint, "streaming connection closed");
    }

    /// Serialize `message` as JSON and send it over the open transport.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Streaming`] when not connected, when `message`
    /// cannot be serialized, or when the transport rejects the write.
    pub async fn send_message<T>(&self, message: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        if !self.is_connected() {
            return Err(AppError::Streaming(
                "not connected to streaming service".into(),
            ));
        }

        let text = serde_json::to_string(message)
            .map_err(|err| AppError::Streaming(format!("failed to serialise message: {err}")))?;

        let mut slot = self.sender.lock().await;
        let Some(sender) = slot.as_mut() else {
            return Err(AppError::Streaming(
                "not connected to streaming service".into(),
            ));
        };
        debug!(payload = text, "sending streaming message");
        sender.send_text(text).await
    }

    /// Ask the simulator to start streaming, connecting first if needed.
    ///
    /// Returns `false` only when the connect step fails. A failed send is
    /// logged and still reported as success, because the transport owns
    /// retries; set `streaming.strict_start` to report it as `false`.
    pub async fn start_streaming(&mut self) -> bool {
        if !self.is_connected() && !self.connect().await {
            return false;
        }

        let message = OutboundMessage::StartStreaming {
            format: self.format.clone(),
        };
        if let Err(err) = self.send_message(&message).await {
            error!(%err, "failed to send start_streaming");
            if self.strict_start {
                return false;
            }
        }

        let mut link = self.link.lock();
        if link.state != StreamState::Disconnected {
            link.state = StreamState::Streaming;
        }
        info!("started streaming");
        true
    }

    /// Ask the simulator to stop streaming. The transport stays open.
    ///
    /// No-op while `Disconnected`.
    pub async fn stop_streaming(&mut self) {
        if !self.is_connected() {
            return;
        }

        if let Err(err) = self.send_message(&OutboundMessage::StopStreaming).await {
            error!(%err, "failed to send stop_streaming");
        }

        let mut link = self.link.lock();
        if link.state == StreamState::Streaming {
            link.state = StreamState::Connected;
        }
        info!("stopped streaming");
    }

    /// Replace the frame consumer.
    pub fn set_frame_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.consumers.lock().frame = Some(boxed_callback(callback));
    }

    /// Replace the audio consumer.
    pub fn set_audio_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.consumers.lock().audio = Some(boxed_callback(callback));
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        let state = self.state();
        StreamStatus {
            state,
            is_connected: state != StreamState::Disconnected,
            is_streaming: state == StreamState::Streaming,
            host: self.host.clone(),
            port: self.port,
            base_url: self.base_url.clone(),
            stream_url: self.client_url.clone(),
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if let Some(cancel) = self.link.lock().cancel.take() {
            cancel.cancel();
        }
    }
}

fn boxed_callback<F, Fut>(callback: F) -> StreamCallback
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| -> BoxFuture<'static, ()> { Box::pin(callback(payload)) })
}

struct ReceiveLoop {
    link: Arc<Mutex<Link>>,
    sender: SenderSlot,
    consumers: Arc<Mutex<Consumers>>,
    generation: u64,
    cancel: CancellationToken,
}

impl ReceiveLoop {
    async fn run(self, mut receiver: Box<dyn StreamReceiver>) {
        loop {
            let frame = tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!("receive loop cancelled");
                    return;
                }

                frame = receiver.next_frame() => frame,
            };

            match frame {
                None => {
                    info!("streaming connection closed by peer");
                    self.mark_disconnected().await;
                    return;
                }
                Some(Err(err)) => {
                    error!(%err, "error receiving streaming messages");
                    self.mark_disconnected().await;
                    return;
                }
                Some(Ok(InboundFrame::Text(text))) => self.dispatch(&text).await,
                Some(Ok(InboundFrame::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => self.dispatch(&text).await,
                    Err(_) => warn!("received non-JSON message"),
                },
            }
        }
    }

    async fn dispatch(&self, text: &str) {
        let message = match parse_inbound(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "received non-JSON message");
                return;
            }
        };

        match message {
            InboundMessage::Frame(payload) => {
                let consumer = self.consumers.lock().frame.clone();
                if let Some(consumer) = consumer {
                    run_consumer("frame", &consumer, payload).await;
                }
            }
            InboundMessage::Audio(payload) => {
                let consumer = self.consumers.lock().audio.clone();
                if let Some(consumer) = consumer {
                    run_consumer("audio", &consumer, payload).await;
                }
            }
            InboundMessage::Status(status) => {
                info!(%status, "status update");
            }
            InboundMessage::Other(kind) => {
                debug!(kind = ?kind, "received message type");
            }
        }
    }

    async fn mark_disconnected(&self) {
        let mut slot = self.sender.lock().await;
        let mut link = self.link.lock();
        if link.generation == self.generation && !self.cancel.is_cancelled() {
            link.state = StreamState::Disconnected;
            link.cancel = None;
            slot.take();
        }
    }
}

/// Await one consumer call. A panicking consumer is logged and the loop
/// keeps reading.
async fn run_consumer(kind: &'static str, consumer: &StreamCallback, payload: Value) {
    if let Err(panic) = AssertUnwindSafe(consumer(payload)).catch_unwind().await {
        error!(kind, reason = panic_message(&*panic), "stream consumer panicked");
    }
}
