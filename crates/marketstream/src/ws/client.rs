/*
[INPUT]:  Protocol adapter, REST collaborator, transport, configuration
[OUTPUT]: StreamClient - subscribe/unsubscribe API over one multiplexed socket
[POS]:    WebSocket layer - generic engine tying connection, registry,
          dispatcher, session keys and reconnection together
[UPDATE]: When adding stream kinds or changing reconnect/resubscribe policy
*/

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{SessionKeyConfig, SessionKeyManager, SessionKeyState};
use crate::error::{Result, StreamError};
use crate::protocol::{BinanceFutures, BinanceSpot, ProtocolAdapter};
use crate::rest::{Credentials, RestClient, RestCollaborator};
use crate::types::{
    AccountBalance, Depth, FundingRate, Kline, KlinePeriod, Market, Order, Position, StreamKind,
    Ticker, Trade,
};
use crate::ws::channel::{ChannelKey, ControlMethod};
use crate::ws::connection::{
    ConnectionManager, ConnectionState, FrameSink, ReconnectPolicy, StreamConfig,
};
use crate::ws::dispatcher::{DispatchOutcome, Dispatcher, InstrumentCache, LogSampler};
use crate::ws::registry::{Handler, SubscriptionRegistry};
use crate::ws::transport::{Transport, TungsteniteTransport};

const SUBSCRIPTION_LOG_LIMIT: usize = 10;

/// Streaming client for one market over one socket
pub struct StreamClient<A: ProtocolAdapter> {
    inner: Arc<ClientInner<A>>,
}

struct ClientInner<A: ProtocolAdapter> {
    adapter: Arc<A>,
    rest: Arc<dyn RestCollaborator>,
    connection: Arc<ConnectionManager>,
    registry: Arc<SubscriptionRegistry>,
    instruments: Arc<InstrumentCache>,
    dispatcher: Arc<Dispatcher<A>>,
    session: Arc<SessionKeyManager>,
    url: RwLock<Option<String>>,
    reconnect: Mutex<Option<CancellationToken>>,
    subscription_logs: LogSampler,
}

impl<A: ProtocolAdapter> Clone for StreamClient<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: ProtocolAdapter> fmt::Debug for StreamClient<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("market", &self.inner.adapter.market())
            .field("state", &self.inner.connection.state())
            .field("subscriptions", &self.inner.registry.len())
            .field("instruments", &self.inner.instruments.len())
            .finish()
    }
}

impl StreamClient<BinanceFutures> {
    /// Binance USD-M futures with production endpoints
    pub fn futures(credentials: Option<Credentials>) -> Result<Self> {
        let mut rest = RestClient::new(Market::Futures)?;
        if let Some(credentials) = credentials {
            rest.set_credentials(credentials);
        }
        Ok(Self::new(BinanceFutures::new(), Arc::new(rest)))
    }
}

impl StreamClient<BinanceSpot> {
    /// Binance spot with production endpoints
    pub fn spot(credentials: Option<Credentials>) -> Result<Self> {
        let mut rest = RestClient::new(Market::Spot)?;
        if let Some(credentials) = credentials {
            rest.set_credentials(credentials);
        }
        Ok(Self::new(BinanceSpot::new(), Arc::new(rest)))
    }
}

impl<A: ProtocolAdapter> StreamClient<A> {
    /// Create a client over tokio-tungstenite with default timings
    pub fn new(adapter: A, rest: Arc<dyn RestCollaborator>) -> Self {
        Self::with_transport(
            adapter,
            rest,
            Arc::new(TungsteniteTransport),
            StreamConfig::default(),
            SessionKeyConfig::default(),
        )
    }

    /// Create a client with an explicit transport and timings
    pub fn with_transport(
        adapter: A,
        rest: Arc<dyn RestCollaborator>,
        transport: Arc<dyn Transport>,
        config: StreamConfig,
        session_config: SessionKeyConfig,
    ) -> Self {
        let adapter = Arc::new(adapter);
        let registry = Arc::new(SubscriptionRegistry::new());
        let instruments = Arc::new(InstrumentCache::new());
        let dispatcher = Arc::new(Dispatcher::new(
            adapter.clone(),
            registry.clone(),
            instruments.clone(),
        ));
        let session = Arc::new(SessionKeyManager::new(
            rest.clone(),
            adapter.session_key_endpoint(),
            session_config,
        ));

        let inner = Arc::new(ClientInner {
            adapter,
            rest,
            connection: Arc::new(ConnectionManager::new(transport, config)),
            registry,
            instruments,
            dispatcher,
            session,
            url: RwLock::new(None),
            reconnect: Mutex::new(None),
            subscription_logs: LogSampler::new(SUBSCRIPTION_LOG_LIMIT),
        });

        let weak = Arc::downgrade(&inner);
        inner.connection.set_lost_hook(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.schedule_reconnect();
            }
        }));

        Self { inner }
    }

    pub fn market(&self) -> Market {
        self.inner.adapter.market()
    }

    pub fn adapter(&self) -> &A {
        &self.inner.adapter
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Read-only view of the instrument metadata cache
    pub fn instruments(&self) -> &InstrumentCache {
        &self.inner.instruments
    }

    /// Number of registered subscriptions
    pub fn registry_len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn session_key_state(&self) -> SessionKeyState {
        self.inner.session.state()
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.inner.connection.set_error_handler(Arc::new(handler));
    }

    pub fn set_connected_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.connection.set_connected_handler(Arc::new(handler));
    }

    pub fn set_disconnected_handler<F>(&self, handler: F)
    where
        F: Fn(Option<&StreamError>) + Send + Sync + 'static,
    {
        self.inner
            .connection
            .set_disconnected_handler(Arc::new(handler));
    }

    /// Connect to the adapter's default endpoint
    pub async fn connect(&self) -> Result<()> {
        let url = self.inner.adapter.endpoint().to_string();
        self.connect_to(&url).await
    }

    /// Load instruments, open the socket and restore registered subscriptions
    pub async fn connect_to(&self, url: &str) -> Result<()> {
        self.inner.establish(url, true).await
    }

    /// Close the socket and stop every background task.
    ///
    /// Subscriptions stay registered and are restored by the next `connect`.
    pub async fn close(&self) -> Result<()> {
        self.inner.cancel_reconnect();
        let result = self.inner.connection.close().await;
        self.inner.session.stop_renewal();
        result
    }

    pub async fn subscribe_depth<F>(
        &self,
        symbol: &str,
        size: usize,
        speed: Option<&str>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&Depth) + Send + Sync + 'static,
    {
        self.subscribe(
            ChannelKey::depth(symbol, size, speed),
            Handler::Depth(Arc::new(handler)),
        )
        .await
    }

    pub async fn unsubscribe_depth(&self, symbol: &str, size: usize, speed: Option<&str>) -> Result<()> {
        self.unsubscribe(ChannelKey::depth(symbol, size, speed)).await
    }

    pub async fn subscribe_ticker<F>(&self, symbol: &str, handler: F) -> Result<()>
    where
        F: Fn(&Ticker) + Send + Sync + 'static,
    {
        self.subscribe(ChannelKey::ticker(symbol), Handler::Ticker(Arc::new(handler)))
            .await
    }

    pub async fn unsubscribe_ticker(&self, symbol: &str) -> Result<()> {
        self.unsubscribe(ChannelKey::ticker(symbol)).await
    }

    pub async fn subscribe_kline<F>(&self, symbol: &str, period: KlinePeriod, handler: F) -> Result<()>
    where
        F: Fn(&Kline) + Send + Sync + 'static,
    {
        self.subscribe(
            ChannelKey::kline(symbol, period),
            Handler::Kline(Arc::new(handler)),
        )
        .await
    }

    pub async fn unsubscribe_kline(&self, symbol: &str, period: KlinePeriod) -> Result<()> {
        self.unsubscribe(ChannelKey::kline(symbol, period)).await
    }

    pub async fn subscribe_trade<F>(&self, symbol: &str, handler: F) -> Result<()>
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.subscribe(ChannelKey::trade(symbol), Handler::Trade(Arc::new(handler)))
            .await
    }

    pub async fn unsubscribe_trade(&self, symbol: &str) -> Result<()> {
        self.unsubscribe(ChannelKey::trade(symbol)).await
    }

    /// Futures only
    pub async fn subscribe_funding_rate<F>(&self, symbol: &str, handler: F) -> Result<()>
    where
        F: Fn(&FundingRate) + Send + Sync + 'static,
    {
        self.subscribe(
            ChannelKey::funding_rate(symbol),
            Handler::FundingRate(Arc::new(handler)),
        )
        .await
    }

    pub async fn unsubscribe_funding_rate(&self, symbol: &str) -> Result<()> {
        self.unsubscribe(ChannelKey::funding_rate(symbol)).await
    }

    /// Order updates (requires credentials)
    pub async fn subscribe_orders<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Order) + Send + Sync + 'static,
    {
        self.subscribe(
            ChannelKey::private(StreamKind::Order),
            Handler::Order(Arc::new(handler)),
        )
        .await
    }

    pub async fn unsubscribe_orders(&self) -> Result<()> {
        self.unsubscribe(ChannelKey::private(StreamKind::Order)).await
    }

    /// Position updates (futures only, requires credentials)
    pub async fn subscribe_positions<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&[Position]) + Send + Sync + 'static,
    {
        self.subscribe(
            ChannelKey::private(StreamKind::Position),
            Handler::Positions(Arc::new(handler)),
        )
        .await
    }

    pub async fn unsubscribe_positions(&self) -> Result<()> {
        self.unsubscribe(ChannelKey::private(StreamKind::Position))
            .await
    }

    /// Balance updates (requires credentials)
    pub async fn subscribe_account<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&[AccountBalance]) + Send + Sync + 'static,
    {
        self.subscribe(
            ChannelKey::private(StreamKind::Account),
            Handler::Account(Arc::new(handler)),
        )
        .await
    }

    pub async fn unsubscribe_account(&self) -> Result<()> {
        self.unsubscribe(ChannelKey::private(StreamKind::Account))
            .await
    }

    async fn subscribe(&self, key: ChannelKey, handler: Handler) -> Result<()> {
        let inner = &self.inner;
        inner.check_supported(key.kind)?;
        if !inner.connection.is_connected() {
            return Err(StreamError::NotConnected);
        }

        let session_key = if key.is_private() {
            if !inner.rest.has_credentials() {
                return Err(StreamError::AuthRequired);
            }
            Some(inner.session.acquire().await?)
        } else {
            None
        };
        let channel = inner.adapter.channel_name(&key, session_key.as_deref())?;

        let private = key.is_private();
        if inner.registry.put(key, handler).is_some() {
            debug!(channel = %channel, "ws handler replaced");
        }
        inner.send_control(ControlMethod::Subscribe, channel).await;
        if private {
            inner.start_renewal();
        }
        Ok(())
    }

    async fn unsubscribe(&self, key: ChannelKey) -> Result<()> {
        let inner = &self.inner;
        inner.check_supported(key.kind)?;
        if !inner.connection.is_connected() {
            return Err(StreamError::NotConnected);
        }

        if !key.is_private() {
            let channel = inner.adapter.channel_name(&key, None)?;
            if inner.registry.remove(&key).is_none() {
                debug!(channel = %channel, "ws unsubscribe for unregistered channel");
            }
            inner.send_control(ControlMethod::Unsubscribe, channel).await;
            return Ok(());
        }

        if inner.registry.remove(&key).is_none() || inner.registry.has_private() {
            // The shared session key channel is still needed (or never was).
            return Ok(());
        }
        inner.session.stop_renewal();
        if let Some(token) = inner.session.current() {
            let channel = inner.adapter.channel_name(&key, Some(token.as_str()))?;
            inner.send_control(ControlMethod::Unsubscribe, channel).await;
        }
        Ok(())
    }
}

impl<A: ProtocolAdapter> ClientInner<A> {
    fn check_supported(&self, kind: StreamKind) -> Result<()> {
        if self.adapter.supports(kind) {
            Ok(())
        } else {
            Err(StreamError::Unsupported {
                market: self.adapter.market(),
                kind,
            })
        }
    }

    fn frame_sink(&self) -> FrameSink {
        let dispatcher = self.dispatcher.clone();
        let connection = Arc::downgrade(&self.connection);
        Arc::new(move |raw: &[u8]| {
            if let DispatchOutcome::Rejected { code, message } = dispatcher.dispatch(raw) {
                if let Some(connection) = connection.upgrade() {
                    connection.emit_error(&StreamError::Api { code, message });
                }
            }
        })
    }

    /// Disconnected -> Connected, then replay the registry.
    async fn establish(self: &Arc<Self>, url: &str, reload_instruments: bool) -> Result<()> {
        self.connection.begin_connect()?;

        if reload_instruments || self.instruments.is_empty() {
            match self.rest.exchange_info().await {
                Ok(info) => {
                    info!(
                        market = %self.adapter.market(),
                        count = info.instruments.len(),
                        "instrument metadata loaded"
                    );
                    self.instruments.replace(info.instruments);
                }
                Err(err) => {
                    self.connection.abort_connect();
                    warn!(error = %err, "instrument metadata unavailable, connect aborted");
                    return Err(err);
                }
            }
        }

        *self.url.write().unwrap_or_else(PoisonError::into_inner) = Some(url.to_string());
        self.connection.establish(url, self.frame_sink()).await?;
        self.resubscribe_all().await;
        Ok(())
    }

    /// Re-issue SUBSCRIBE for every registry entry, in registry order.
    ///
    /// Identical channel strings are sent once; a failing channel does not
    /// stop the others.
    async fn resubscribe_all(&self) -> usize {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            return 0;
        }

        let session_key = if snapshot.iter().any(|(key, _)| key.is_private()) {
            match self.session.acquire().await {
                Ok(token) => Some(token),
                Err(err) => {
                    warn!(error = %err, "session key unavailable, private channels not restored");
                    None
                }
            }
        } else {
            None
        };

        let mut seen = HashSet::new();
        let mut sent = 0;
        for (key, _) in snapshot {
            if key.is_private() && session_key.is_none() {
                continue;
            }
            let channel = match self.adapter.channel_name(&key, session_key.as_deref()) {
                Ok(channel) => channel,
                Err(err) => {
                    warn!(key = %key, error = %err, "ws resubscribe skipped");
                    continue;
                }
            };
            if !seen.insert(channel.clone()) {
                continue;
            }
            if self.send_control(ControlMethod::Subscribe, channel).await {
                sent += 1;
            }
        }

        if session_key.is_some() {
            self.start_renewal();
        }
        info!(channels = sent, "ws subscriptions restored");
        sent
    }

    /// Send one control message. Failures are logged and reported through
    /// the error handler; the registry stays the source of truth.
    async fn send_control(&self, method: ControlMethod, channel: String) -> bool {
        let message = match self
            .adapter
            .build_control_message(method, vec![channel.clone()])
        {
            Ok(message) => message,
            Err(err) => {
                warn!(channel = %channel, error = %err, "ws control message not built");
                return false;
            }
        };

        match self.connection.send_text(message).await {
            Ok(()) => {
                if let Some(index) = self.subscription_logs.sample() {
                    info!(
                        sample_index = index,
                        sample_limit = self.subscription_logs.limit(),
                        action = method.as_str(),
                        channel = %channel,
                        "ws subscription sent"
                    );
                } else {
                    debug!(action = method.as_str(), channel = %channel, "ws subscription sent");
                }
                true
            }
            Err(err) => {
                warn!(action = method.as_str(), channel = %channel, error = %err, "ws subscription send failed");
                self.connection.emit_error(&err);
                false
            }
        }
    }

    fn start_renewal(&self) {
        let registry = Arc::downgrade(&self.registry);
        self.session
            .start_renewal(move || registry.upgrade().is_some_and(|registry| registry.has_private()));
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let policy = self.connection.config().reconnect.clone();
        if !policy.enabled {
            return;
        }
        let Some(url) = self
            .url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        else {
            return;
        };

        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .reconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel.clone())
        {
            previous.cancel();
        }
        tokio::spawn(reconnect_loop(Arc::downgrade(self), url, policy, cancel));
    }

    fn cancel_reconnect(&self) {
        let cancel = self
            .reconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
    }
}

impl<A: ProtocolAdapter> Drop for ClientInner<A> {
    fn drop(&mut self) {
        self.cancel_reconnect();
        self.session.stop_renewal();
        self.connection.shutdown();
    }
}

async fn reconnect_loop<A: ProtocolAdapter>(
    client: Weak<ClientInner<A>>,
    url: String,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
) {
    for attempt in 1..=policy.max_retries {
        let delay = policy.backoff(attempt);
        info!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            "ws reconnect scheduled"
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(inner) = client.upgrade() else {
            return;
        };
        match inner.establish(&url, false).await {
            Ok(()) => {
                info!(attempt, "ws reconnected");
                if cancel.is_cancelled() {
                    // Closed while the reconnect was in flight.
                    let _ = inner.connection.close().await;
                }
                return;
            }
            Err(StreamError::AlreadyConnected) => return,
            Err(err) => warn!(attempt, error = %err, "ws reconnect failed"),
        }
    }
    warn!(max_retries = policy.max_retries, "ws reconnect attempts exhausted");
}
