/*
[INPUT]:  Spot stream frames and subscription keys
[OUTPUT]: ProtocolAdapter for Binance spot
[POS]:    Protocol layer - spot market adapter
[UPDATE]: When spot stream names or endpoints change
*/

use crate::auth::SessionKeyEndpoint;
use crate::error::Result;
use crate::protocol::binance::streams::{self, StreamNames};
use crate::protocol::binance::{self as binance, BinanceEvent};
use crate::protocol::{InboundFrame, ProtocolAdapter, RoutedEvent};
use crate::types::{Market, StreamKind};
use crate::ws::channel::{ChannelKey, ChannelName};
use crate::ws::dispatcher::InstrumentCache;

pub const SPOT_STREAM_URL: &str = "wss://stream.binance.com:9443/stream";

const NAMES: StreamNames = StreamNames {
    trade: "trade",
    funding_rate: None,
};

/// Binance spot: raw trades, no funding rate or positions
#[derive(Debug, Clone)]
pub struct BinanceSpot {
    endpoint: String,
}

impl BinanceSpot {
    pub fn new() -> Self {
        Self::with_endpoint(SPOT_STREAM_URL)
    }

    /// Partial book payloads are only routable on a combined `/stream` endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for BinanceSpot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolAdapter for BinanceSpot {
    type Event = BinanceEvent;

    fn market(&self) -> Market {
        Market::Spot
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn session_key_endpoint(&self) -> SessionKeyEndpoint {
        SessionKeyEndpoint::SPOT
    }

    fn supports(&self, kind: StreamKind) -> bool {
        !matches!(kind, StreamKind::FundingRate | StreamKind::Position)
    }

    fn channel_name(&self, key: &ChannelKey, session_key: Option<&str>) -> Result<String> {
        streams::channel_name(NAMES, key, session_key)
    }

    fn channel_key(&self, name: &ChannelName) -> Option<ChannelKey> {
        streams::channel_key(NAMES, name)
    }

    fn classify_frame(&self, raw: &[u8]) -> Result<InboundFrame<BinanceEvent>> {
        binance::classify(raw)
    }

    fn map_event(
        &self,
        event: BinanceEvent,
        instruments: &InstrumentCache,
    ) -> Result<Vec<RoutedEvent>> {
        binance::map_event(NAMES, event, instruments)
    }
}
