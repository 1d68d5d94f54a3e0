// Chat Socket Module
// Reconnecting WebSocket client for per-room chat with exponential backoff

pub mod connector;
pub mod envelope;

pub use connector::{Connector, Frame, FrameSink, FrameStream, Transport, TungsteniteConnector, NORMAL_CLOSURE};
pub use envelope::{backoff_delay, chat_url, OutboundMessage, CHAT_MESSAGE_TYPE};

use crate::config::SocketConfig;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Outbound frames buffered while the writer is busy
const OUTBOUND_BUFFER: usize = 64;

/// Error type for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Invalid chat URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Idle,
    Connecting,
    Open,
    Closed,
}

pub type MessageHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;
pub type ConnectionHandler = Arc<dyn Fn(bool) + Send + Sync>;

/// Callbacks invoked from the socket's background task
#[derive(Clone, Default)]
pub struct SocketHandlers {
    on_message: Option<MessageHandler>,
    on_connection_change: Option<ConnectionHandler>,
}

impl SocketHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with every well-formed inbound JSON object
    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(handler));
        self
    }

    /// Called with `true` when a connection opens and `false` when it closes
    pub fn on_connection_change<F>(mut self, handler: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_connection_change = Some(Arc::new(handler));
        self
    }
}

#[derive(Debug, Clone)]
struct ChatTarget {
    room_id: String,
    token: String,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Closed with the normal-closure code; no retry
    Intentional,
    /// Error, abnormal close or dropped stream; eligible for retry
    Failed,
}

struct Shared {
    state: RwLock<SocketState>,
    /// Bumped whenever a driver is started or stopped; stale drivers stand down
    epoch: AtomicU64,
    attempts: AtomicU32,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    target: Mutex<Option<ChatTarget>>,
    cancel: Mutex<Option<CancellationToken>>,
    handlers: SocketHandlers,
}

impl Shared {
    /// Move to `next` unless a newer driver has taken over
    fn transition(&self, epoch: u64, next: SocketState) -> bool {
        let mut state = self.state.write();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        *state = next;
        true
    }

    fn notify_connection(&self, connected: bool) {
        if let Some(handler) = &self.handlers.on_connection_change {
            handler(connected);
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(text) {
            Ok(payload) => {
                if let Some(handler) = &self.handlers.on_message {
                    handler(serde_json::Value::Object(payload));
                }
            }
            Err(e) => warn!(error = %e, "Dropping malformed chat payload"),
        }
    }
}

/// Reconnecting chat client for one room at a time.
///
/// Dropping the client closes the connection intentionally.
pub struct ChatSocket {
    config: SocketConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

impl ChatSocket {
    pub fn new(config: SocketConfig, connector: Arc<dyn Connector>, handlers: SocketHandlers) -> Self {
        Self {
            config,
            connector,
            shared: Arc::new(Shared {
                state: RwLock::new(SocketState::Idle),
                epoch: AtomicU64::new(0),
                attempts: AtomicU32::new(0),
                outbound: Mutex::new(None),
                target: Mutex::new(None),
                cancel: Mutex::new(None),
                handlers,
            }),
        }
    }

    pub fn state(&self) -> SocketState {
        *self.shared.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SocketState::Open
    }

    /// Automatic reconnect attempts made since the last successful open
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Open a connection to `room_id`. No-op while connecting or open.
    ///
    /// Returns whether a new connection attempt was started.
    pub fn connect(&self, room_id: &str, token: &str) -> bool {
        if matches!(self.state(), SocketState::Connecting | SocketState::Open) {
            debug!(room_id = %room_id, "Chat socket already connecting or connected");
            return false;
        }

        *self.shared.target.lock() = Some(ChatTarget {
            room_id: room_id.to_string(),
            token: token.to_string(),
        });
        self.start()
    }

    /// Reconnect to the last room after giving up, with a fresh attempt budget
    pub fn retry(&self) -> bool {
        if matches!(self.state(), SocketState::Connecting | SocketState::Open) {
            return false;
        }
        if self.shared.target.lock().is_none() {
            warn!("Chat socket retry requested before any connect");
            return false;
        }
        self.start()
    }

    /// Close intentionally; suppresses automatic reconnection
    pub fn disconnect(&self) {
        let was_active = {
            let mut state = self.shared.state.write();
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            let was_active = matches!(*state, SocketState::Connecting | SocketState::Open);
            if *state != SocketState::Idle {
                *state = SocketState::Closed;
            }
            was_active
        };

        if let Some(cancel) = self.shared.cancel.lock().take() {
            cancel.cancel();
        }
        *self.shared.outbound.lock() = None;
        self.shared.attempts.store(0, Ordering::SeqCst);

        if was_active {
            self.shared.notify_connection(false);
        }
        info!("Chat socket disconnected");
    }

    /// Send a chat message. Returns `false` when the socket is not open.
    pub fn send_message(&self, content: &str, image_url: Option<&str>) -> bool {
        if !self.is_connected() {
            debug!("Chat socket not open, message not sent");
            return false;
        }

        let json = match OutboundMessage::chat(content, image_url, Utc::now()).to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to encode chat message");
                return false;
            }
        };

        match self.shared.outbound.lock().as_ref() {
            Some(sender) => sender.try_send(Frame::Text(json)).is_ok(),
            None => false,
        }
    }

    fn start(&self) -> bool {
        let Some(target) = self.shared.target.lock().clone() else {
            return false;
        };

        let url = match chat_url(&self.config, &target.room_id, &target.token) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Cannot build chat URL");
                return false;
            }
        };

        let epoch = {
            let mut state = self.shared.state.write();
            if matches!(*state, SocketState::Connecting | SocketState::Open) {
                return false;
            }
            *state = SocketState::Connecting;
            self.shared.attempts.store(0, Ordering::SeqCst);
            self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        let cancel = CancellationToken::new();
        if let Some(previous) = self.shared.cancel.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let span = tracing::info_span!(
            "chat_socket",
            room_id = %target.room_id,
            connection_id = %Uuid::new_v4(),
        );
        tokio::spawn(
            drive(
                self.shared.clone(),
                self.connector.clone(),
                self.config.clone(),
                url.to_string(),
                epoch,
                cancel,
            )
            .instrument(span),
        );

        true
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        if let Some(cancel) = self.shared.cancel.lock().take() {
            cancel.cancel();
        }
    }
}

/// Connection loop: connect, run the session, back off, repeat
async fn drive(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    config: SocketConfig,
    url: String,
    epoch: u64,
    cancel: CancellationToken,
) {
    loop {
        if !shared.transition(epoch, SocketState::Connecting) {
            return;
        }

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connector.connect(&url) => result,
        };

        let end = match connected {
            Ok(transport) => {
                let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER);
                if !shared.transition(epoch, SocketState::Open) {
                    return;
                }
                *shared.outbound.lock() = Some(sender);

                shared.attempts.store(0, Ordering::SeqCst);
                info!("Chat socket connected");
                shared.notify_connection(true);

                let end = run_session(&shared, transport, receiver, &cancel).await;
                if shared.epoch.load(Ordering::SeqCst) == epoch {
                    *shared.outbound.lock() = None;
                }
                end
            }
            Err(e) => {
                warn!(error = %e, "Chat socket connection failed");
                SessionEnd::Failed
            }
        };

        if !shared.transition(epoch, SocketState::Closed) {
            return;
        }
        shared.notify_connection(false);

        if end == SessionEnd::Intentional || cancel.is_cancelled() {
            info!("Chat socket closed intentionally, not reconnecting");
            return;
        }

        let attempt = shared.attempts.load(Ordering::SeqCst);
        if attempt >= config.max_reconnect_attempts {
            warn!(attempts = attempt, "Max reconnect attempts reached");
            return;
        }

        let delay = backoff_delay(attempt, config.base_delay_ms, config.max_delay_ms);
        shared.attempts.store(attempt + 1, Ordering::SeqCst);
        info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump frames both ways until the connection ends
async fn run_session(
    shared: &Shared,
    transport: Transport,
    mut outbound: mpsc::Receiver<Frame>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let Transport { mut sink, mut stream } = transport;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Frame::Close(Some(NORMAL_CLOSURE))).await {
                    debug!(error = %e, "Close frame not delivered");
                }
                return SessionEnd::Intentional;
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "Chat socket write failed");
                    return SessionEnd::Failed;
                }
            }
            next = stream.next() => match next {
                Some(Ok(Frame::Text(text))) => shared.dispatch(&text),
                Some(Ok(Frame::Close(code))) => {
                    info!(code = ?code, "Chat socket closed by server");
                    return if code == Some(NORMAL_CLOSURE) {
                        SessionEnd::Intentional
                    } else {
                        SessionEnd::Failed
                    };
                }
                Some(Ok(Frame::Other)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "Chat socket error");
                    return SessionEnd::Failed;
                }
                None => {
                    info!("Chat socket stream ended");
                    return SessionEnd::Failed;
                }
            }
        }
    }
}
