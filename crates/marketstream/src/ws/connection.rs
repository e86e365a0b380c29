/*
[INPUT]:  Transport, endpoint URL, timing configuration, inbound frame sink
[OUTPUT]: Connection state machine with receive loop, heartbeat and callbacks
[POS]:    WebSocket layer - owns the raw duplex socket
[UPDATE]: When changing connection lifecycle, timeouts or callback semantics
*/

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};
use crate::ws::transport::{Frame, FrameReader, FrameWriter, Transport};

/// Exponential backoff settings for automatic reconnection
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry `attempt` (1-based): base * 2^(attempt-1), clamped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Connection timing configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub ping_interval: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub type ErrorHandler = Arc<dyn Fn(&StreamError) + Send + Sync>;
pub type ConnectedHandler = Arc<dyn Fn() + Send + Sync>;
pub type DisconnectedHandler = Arc<dyn Fn(Option<&StreamError>) + Send + Sync>;
/// Receives the payload of every text or binary frame, in wire order
pub type FrameSink = Arc<dyn Fn(&[u8]) + Send + Sync>;
pub(crate) type LostHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    error: Option<ErrorHandler>,
    connected: Option<ConnectedHandler>,
    disconnected: Option<DisconnectedHandler>,
    lost: Option<LostHook>,
}

struct StateCell {
    state: ConnectionState,
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Owns one socket at a time.
///
/// Each established connection gets a generation number; background tasks of
/// an older generation can never tear down a newer connection.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    config: StreamConfig,
    cell: RwLock<StateCell>,
    writer: Mutex<Option<(u64, Box<dyn FrameWriter>)>>,
    callbacks: RwLock<Callbacks>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &self.transport)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, config: StreamConfig) -> Self {
        Self {
            transport,
            config,
            cell: RwLock::new(StateCell {
                state: ConnectionState::Disconnected,
                generation: 0,
                cancel: None,
            }),
            writer: Mutex::new(None),
            callbacks: RwLock::new(Callbacks::default()),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Generation of the current (or last) connection
    pub fn generation(&self) -> u64 {
        self.cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.callbacks_mut().error = Some(handler);
    }

    pub fn set_connected_handler(&self, handler: ConnectedHandler) {
        self.callbacks_mut().connected = Some(handler);
    }

    pub fn set_disconnected_handler(&self, handler: DisconnectedHandler) {
        self.callbacks_mut().disconnected = Some(handler);
    }

    /// Fired after an unexpected disconnect, once handlers have run.
    pub(crate) fn set_lost_hook(&self, hook: LostHook) {
        self.callbacks_mut().lost = Some(hook);
    }

    /// Report an asynchronous failure through the error handler.
    pub fn emit_error(&self, err: &StreamError) {
        if let Some(handler) = self.callbacks().error {
            handler(err);
        }
    }

    /// Disconnected -> Connecting.
    pub fn begin_connect(&self) -> Result<()> {
        let mut cell = self.cell.write().unwrap_or_else(PoisonError::into_inner);
        if cell.state != ConnectionState::Disconnected {
            return Err(StreamError::AlreadyConnected);
        }
        cell.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Connecting -> Disconnected, for a connect that failed before the handshake.
    pub fn abort_connect(&self) {
        let mut cell = self.cell.write().unwrap_or_else(PoisonError::into_inner);
        if cell.state == ConnectionState::Connecting {
            cell.state = ConnectionState::Disconnected;
        }
    }

    /// `begin_connect` followed by `establish`.
    pub async fn connect(self: &Arc<Self>, url: &str, sink: FrameSink) -> Result<u64> {
        self.begin_connect()?;
        self.establish(url, sink).await
    }

    /// Handshake and start the receive loop and heartbeat.
    ///
    /// Must follow a successful `begin_connect`. Fires the connected handler
    /// on success and returns the new generation.
    pub async fn establish(self: &Arc<Self>, url: &str, sink: FrameSink) -> Result<u64> {
        if self.state() != ConnectionState::Connecting {
            return Err(StreamError::AlreadyConnected);
        }

        let handshake = timeout(self.config.handshake_timeout, self.transport.connect(url)).await;
        let (writer, reader) = match handshake {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                self.abort_connect();
                warn!(url, error = %err, "ws connect failed");
                return Err(err);
            }
            Err(_) => {
                self.abort_connect();
                warn!(url, "ws handshake timed out");
                return Err(StreamError::Timeout {
                    operation: "handshake",
                    after: self.config.handshake_timeout,
                });
            }
        };

        let cancel = CancellationToken::new();
        let generation = {
            let mut cell = self.cell.write().unwrap_or_else(PoisonError::into_inner);
            if cell.state != ConnectionState::Connecting {
                // Closed while the handshake was in flight.
                return Err(StreamError::NotConnected);
            }
            cell.generation += 1;
            cell.cancel = Some(cancel.clone());
            cell.generation
        };
        *self.writer.lock().await = Some((generation, writer));
        {
            let mut cell = self.cell.write().unwrap_or_else(PoisonError::into_inner);
            if cell.generation != generation || cell.state != ConnectionState::Connecting {
                cancel.cancel();
                return Err(StreamError::NotConnected);
            }
            cell.state = ConnectionState::Connected;
        }

        tokio::spawn(self.clone().receive_loop(generation, cancel.clone(), reader, sink));
        tokio::spawn(self.clone().heartbeat_loop(generation, cancel));

        info!(url, generation, "ws connected");
        if let Some(handler) = self.callbacks().connected {
            handler();
        }
        Ok(generation)
    }

    /// Send a close frame, stop background tasks and enter Disconnected.
    pub async fn close(&self) -> Result<()> {
        let (generation, cancel) = {
            let mut cell = self.cell.write().unwrap_or_else(PoisonError::into_inner);
            if cell.state != ConnectionState::Connected {
                return Err(StreamError::NotConnected);
            }
            cell.state = ConnectionState::Disconnected;
            (cell.generation, cell.cancel.take())
        };

        if let Some(mut writer) = self.take_writer(generation).await {
            match timeout(self.config.write_timeout, writer.send(Frame::Close)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(error = %err, "ws close frame not delivered"),
                Err(_) => debug!("ws close frame timed out"),
            }
        }
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        info!(generation, "ws closed");
        if let Some(handler) = self.callbacks().disconnected {
            handler(None);
        }
        Ok(())
    }

    /// Stop background tasks without a close frame or callbacks.
    pub(crate) fn shutdown(&self) {
        let cancel = {
            let mut cell = self.cell.write().unwrap_or_else(PoisonError::into_inner);
            cell.state = ConnectionState::Disconnected;
            cell.cancel.take()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
    }

    /// Write a text frame within the write deadline.
    pub async fn send_text(&self, text: String) -> Result<()> {
        if !self.is_connected() {
            return Err(StreamError::NotConnected);
        }
        self.write_frame(Frame::Text(text)).await
    }

    async fn write_frame(&self, frame: Frame) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let (_, writer) = guard.as_mut().ok_or(StreamError::NotConnected)?;
        match timeout(self.config.write_timeout, writer.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::Timeout {
                operation: "write",
                after: self.config.write_timeout,
            }),
        }
    }

    async fn take_writer(&self, generation: u64) -> Option<Box<dyn FrameWriter>> {
        let mut guard = self.writer.lock().await;
        match guard.as_ref() {
            Some((owner, _)) if *owner == generation => guard.take().map(|(_, writer)| writer),
            _ => None,
        }
    }

    async fn receive_loop(
        self: Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        mut reader: Box<dyn FrameReader>,
        sink: FrameSink,
    ) {
        let read_timeout = self.config.read_timeout;
        let cause = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = timeout(read_timeout, reader.next_frame()) => match next {
                    Err(_) => break Some(StreamError::Timeout { operation: "read", after: read_timeout }),
                    Ok(None) => break Some(StreamError::Transport("connection closed".to_string())),
                    Ok(Some(Err(err))) => break Some(err),
                    Ok(Some(Ok(frame))) => match frame {
                        // Handlers run inline: a slow handler delays the next read.
                        Frame::Text(text) => sink(text.as_bytes()),
                        Frame::Binary(bytes) => sink(&bytes),
                        Frame::Ping(_) | Frame::Pong(_) => {}
                        Frame::Close => break None,
                    },
                },
            }
        };
        self.connection_lost(generation, cause).await;
    }

    async fn heartbeat_loop(self: Arc<Self>, generation: u64, cancel: CancellationToken) {
        let period = self.config.ping_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(err) = self.write_frame(Frame::Ping(Vec::new())).await {
                        self.connection_lost(generation, Some(err)).await;
                        return;
                    }
                    debug!(generation, "ws ping sent");
                }
            }
        }
    }

    /// Connected -> Disconnected for `generation`; no-op for stale generations.
    async fn connection_lost(&self, generation: u64, cause: Option<StreamError>) {
        let cancel = {
            let mut cell = self.cell.write().unwrap_or_else(PoisonError::into_inner);
            if cell.generation != generation || cell.state != ConnectionState::Connected {
                return;
            }
            cell.state = ConnectionState::Disconnected;
            cell.cancel.take()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        drop(self.take_writer(generation).await);

        let callbacks = self.callbacks();
        match &cause {
            Some(err) => {
                warn!(generation, error = %err, "ws connection lost");
                if let Some(handler) = &callbacks.error {
                    handler(err);
                }
            }
            None => info!(generation, "ws closed by peer"),
        }
        if let Some(handler) = &callbacks.disconnected {
            handler(cause.as_ref());
        }
        if let Some(hook) = &callbacks.lost {
            hook();
        }
    }

    fn callbacks(&self) -> Callbacks {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn callbacks_mut(&self) -> std::sync::RwLockWriteGuard<'_, Callbacks> {
        self.callbacks.write().unwrap_or_else(PoisonError::into_inner)
    }
}
