use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::core::runtime::Scheduler;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, instrument, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport tuning
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Give up on a single connect attempt after this long
    pub connect_timeout: Duration,
    /// Ping cadence; three silent intervals force a reconnect
    pub heartbeat_interval: Duration,
    /// First reconnect delay, doubled per consecutive failure
    pub initial_reconnect_delay: Duration,
    /// Upper bound on the reconnect delay
    pub max_reconnect_delay: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            initial_reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl WsConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_reconnect_delay = initial;
        self.max_reconnect_delay = max.max(initial);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
}

/// Queues outbound frames for the session's socket.
///
/// Frames still queued when the connection drops are discarded; handshake
/// frames are re-issued by [`FrameHandler::on_connected`] after reconnect.
#[derive(Clone, Debug)]
pub struct WsSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl WsSender {
    pub fn send(&self, message: Message) -> Result<(), ExchangeError> {
        self.tx
            .send(message)
            .map_err(|_| ExchangeError::NotConnected("session closed".to_string()))
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), ExchangeError> {
        self.send(Message::Text(text.into()))
    }

    pub fn send_json(&self, value: &Value) -> Result<(), ExchangeError> {
        self.send_text(value.to_string())
    }
}

/// Per-session protocol logic on top of the transport.
#[async_trait]
pub trait FrameHandler<M>: Send + Sync + 'static {
    /// Whether `on_connected` performs an authentication handshake.
    fn requires_auth(&self) -> bool {
        false
    }

    /// Runs after every successful connect, before the session is `Ready`.
    /// An error here drops the connection and schedules a reconnect.
    async fn on_connected(&self, sender: &WsSender) -> Result<(), ExchangeError>;

    /// Runs each time the session reaches `Ready`.
    async fn on_ready(&self) {}

    /// Processes one decoded frame. Calls for the same lane never overlap.
    async fn handle(&self, message: M);

    /// Runs after a live connection is lost or a connect attempt fails.
    async fn on_disconnected(&self, _error: &ExchangeError) {}
}

/// Exponential backoff with up to 20% random jitter.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let jitter_range = (base.as_millis() as u64) / 5;
        let jitter = if jitter_range == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_range)
        };
        self.current = (self.current * 2).min(self.max);
        base + Duration::from_millis(jitter)
    }
}

/// Handle to a running session task.
#[derive(Debug)]
pub struct SessionHandle {
    name: String,
    sender: WsSender,
    state: watch::Receiver<SessionState>,
    shutdown: watch::Sender<bool>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sender(&self) -> &WsSender {
        &self.sender
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch channel that sees every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session reaches `target` or `timeout` elapses.
    pub async fn wait_for(&self, target: SessionState, timeout: Duration) -> bool {
        let mut rx = self.state.clone();
        tokio::time::timeout(timeout, async move {
            loop {
                if *rx.borrow_and_update() == target {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        })
        .await
        .unwrap_or(false)
    }

    /// Close the socket and stop reconnecting.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// One exchange WebSocket connection with automatic reconnect.
///
/// `Disconnected -> Connecting -> Connected -> (Authenticating) -> Ready`, back to
/// `Disconnected` on any socket failure, then `Connecting` again after a backoff
/// delay. Retries are not capped.
pub struct WsSession<C: WsCodec, H: FrameHandler<C::Message>> {
    name: String,
    url: String,
    config: WsConfig,
    codec: Arc<C>,
    handler: Arc<H>,
    scheduler: Arc<Scheduler>,
    sender: WsSender,
    state: watch::Sender<SessionState>,
}

impl<C, H> WsSession<C, H>
where
    C: WsCodec,
    H: FrameHandler<C::Message>,
{
    /// Start the session task and return its handle.
    ///
    /// `name` identifies the session in logs and prefixes its dispatch lanes.
    pub fn spawn(
        name: impl Into<String>,
        url: impl Into<String>,
        config: WsConfig,
        codec: C,
        handler: Arc<H>,
        scheduler: Arc<Scheduler>,
    ) -> SessionHandle {
        let name = name.into();
        let (tx, outbound) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(SessionState::Disconnected);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let sender = WsSender { tx };

        let session = Self {
            name: name.clone(),
            url: url.into(),
            config,
            codec: Arc::new(codec),
            handler,
            scheduler,
            sender: sender.clone(),
            state,
        };
        let task = tokio::spawn(session.run(outbound, shutdown_rx));

        SessionHandle {
            name,
            sender,
            state: state_rx,
            shutdown,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    fn set_state(&self, state: SessionState) {
        debug!(session = %self.name, ?state, "session state");
        self.state.send_replace(state);
    }

    async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut backoff = Backoff::new(
            self.config.initial_reconnect_delay,
            self.config.max_reconnect_delay,
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let attempt = tokio::select! {
                result = self.connect() => result,
                _ = shutdown.changed() => break,
            };

            let error = match attempt {
                Ok(socket) => {
                    backoff.reset();
                    let outcome = self.drive(socket, &mut outbound, &mut shutdown).await;
                    while outbound.try_recv().is_ok() {}
                    match outcome {
                        Some(error) => error,
                        None => break,
                    }
                }
                Err(error) => error,
            };

            self.set_state(SessionState::Disconnected);
            warn!(session = %self.name, error = %error, "connection lost");
            self.handler.on_disconnected(&error).await;

            let delay = backoff.next_delay();
            info!(session = %self.name, delay_ms = delay.as_millis() as u64, "reconnecting after delay");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(SessionState::Disconnected);
        debug!(session = %self.name, "session stopped");
    }

    #[instrument(skip(self), fields(session = %self.name, url = %self.url))]
    async fn connect(&self) -> Result<Socket, ExchangeError> {
        self.set_state(SessionState::Connecting);

        let (socket, _) = tokio::time::timeout(self.config.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| {
                ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string())
            })?
            .map_err(|e| {
                ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e))
            })?;

        info!("connected");
        Ok(socket)
    }

    /// Pump one live connection. `None` means shutdown was requested.
    async fn drive(
        &self,
        socket: Socket,
        outbound: &mut mpsc::UnboundedReceiver<Message>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<ExchangeError> {
        let (mut write, mut read) = socket.split();

        self.set_state(SessionState::Connected);
        if self.handler.requires_auth() {
            self.set_state(SessionState::Authenticating);
        }
        if let Err(e) = self.handler.on_connected(&self.sender).await {
            return Some(e);
        }
        self.set_state(SessionState::Ready);
        self.handler.on_ready().await;

        let heartbeat = self.config.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_inbound = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return None;
                }
                Some(message) = outbound.recv() => {
                    if let Err(e) = write.send(message).await {
                        return Some(ExchangeError::NetworkError(format!(
                            "Failed to send WebSocket message: {}",
                            e
                        )));
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(message)) => {
                        last_inbound = Instant::now();
                        match message {
                            Message::Ping(data) => {
                                if let Err(e) = write.send(Message::Pong(data)).await {
                                    warn!(session = %self.name, "Failed to send pong response: {}", e);
                                }
                            }
                            Message::Pong(_) | Message::Frame(_) => {}
                            Message::Close(_) => {
                                return Some(ExchangeError::NetworkError(
                                    "connection closed by peer".to_string(),
                                ));
                            }
                            data => self.dispatch(data),
                        }
                    }
                    Some(Err(e)) => {
                        return Some(ExchangeError::NetworkError(format!("WebSocket error: {}", e)));
                    }
                    None => {
                        return Some(ExchangeError::NetworkError("stream ended".to_string()));
                    }
                },
                _ = ticker.tick() => {
                    if last_inbound.elapsed() >= heartbeat * 3 {
                        return Some(ExchangeError::ConnectionTimeout(
                            "no inbound frames for three heartbeat intervals".to_string(),
                        ));
                    }
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        return Some(ExchangeError::NetworkError(format!("Failed to send ping: {}", e)));
                    }
                }
            }
        }
    }

    /// Decode and hand off to the frame's lane; never awaits the handler.
    fn dispatch(&self, message: Message) {
        match self.codec.decode_message(message) {
            Ok(Some(decoded)) => {
                let lane = format!("{}.{}", self.name, self.codec.lane(&decoded));
                let handler = self.handler.clone();
                self.scheduler
                    .lane(&lane)
                    .submit(async move { handler.handle(decoded).await });
            }
            Ok(None) => {}
            Err(e) => warn!(session = %self.name, error = %e, "dropping malformed frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(120));
        let second = backoff.next_delay();
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(240));
        let third = backoff.next_delay();
        assert!(third >= Duration::from_millis(350) && third <= Duration::from_millis(420));
        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(120));
    }

    #[test]
    fn test_reconnect_delay_never_below_initial() {
        let config = WsConfig::default()
            .with_reconnect_delay(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_sender_reports_closed_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sender = WsSender { tx };
        assert!(matches!(
            sender.send_text("{}"),
            Err(ExchangeError::NotConnected(_))
        ));
    }
}
