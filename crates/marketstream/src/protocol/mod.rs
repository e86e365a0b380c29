/*
[INPUT]:  Channel keys, raw inbound frames, instrument cache
[OUTPUT]: Control messages, classified frames, routed domain events
[POS]:    Protocol layer - per-market capability set plugged into the generic engine
[UPDATE]: When adding a market or changing the adapter contract
*/

pub mod binance;

use std::fmt;

use crate::auth::SessionKeyEndpoint;
use crate::error::Result;
use crate::types::{Market, StreamEvent, StreamKind};
use crate::ws::channel::{ChannelKey, ChannelName, ControlMessage, ControlMethod};
use crate::ws::dispatcher::InstrumentCache;

pub use binance::{BinanceFutures, BinanceSpot};

/// Result of classifying one inbound frame
#[derive(Debug)]
pub enum InboundFrame<E> {
    /// Market or account event
    Event(E),
    /// Acknowledgement of a control message
    Ack { id: Option<String> },
    /// Error reported by the exchange
    Error { code: i64, message: String },
    /// Well-formed but not handled by this adapter
    Ignored { event_type: String },
}

/// Where a mapped event should be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Exact registry key
    Key(ChannelKey),
    /// First registered entry of `kind` for `symbol` (payload lacks the full key)
    FirstOf { kind: StreamKind, symbol: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutedEvent {
    pub route: Route,
    pub event: StreamEvent,
}

impl RoutedEvent {
    pub fn new(route: Route, event: StreamEvent) -> Self {
        Self { route, event }
    }
}

/// Market-specific half of the streaming engine.
pub trait ProtocolAdapter: Send + Sync + fmt::Debug + 'static {
    /// Decoded, not yet enriched, event
    type Event: Send + fmt::Debug;

    fn market(&self) -> Market;

    /// Default streaming endpoint
    fn endpoint(&self) -> &str;

    fn session_key_endpoint(&self) -> SessionKeyEndpoint;

    fn supports(&self, kind: StreamKind) -> bool;

    /// Channel string for `key`. Private kinds use the session key itself.
    fn channel_name(&self, key: &ChannelKey, session_key: Option<&str>) -> Result<String>;

    /// Inverse of `channel_name` for public channels.
    fn channel_key(&self, name: &ChannelName) -> Option<ChannelKey>;

    fn build_control_message(&self, method: ControlMethod, channels: Vec<String>) -> Result<String> {
        ControlMessage::new(method, channels).to_json()
    }

    fn classify_frame(&self, raw: &[u8]) -> Result<InboundFrame<Self::Event>>;

    /// Enrich with instrument metadata and pick delivery routes.
    ///
    /// Fails with `UnknownSymbol` when the event's instrument is not cached.
    fn map_event(&self, event: Self::Event, instruments: &InstrumentCache)
    -> Result<Vec<RoutedEvent>>;
}
