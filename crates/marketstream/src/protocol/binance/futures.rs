/*
[INPUT]:  USD-M futures stream frames and subscription keys
[OUTPUT]: ProtocolAdapter for Binance USD-M futures
[POS]:    Protocol layer - futures market adapter
[UPDATE]: When futures stream names or endpoints change
*/

use crate::auth::SessionKeyEndpoint;
use crate::error::Result;
use crate::protocol::binance::streams::{self, StreamNames};
use crate::protocol::binance::{self as binance, BinanceEvent};
use crate::protocol::{InboundFrame, ProtocolAdapter, RoutedEvent};
use crate::types::{Market, StreamKind};
use crate::ws::channel::{ChannelKey, ChannelName};
use crate::ws::dispatcher::InstrumentCache;

pub const FUTURES_STREAM_URL: &str = "wss://fstream.binance.com/stream";

const NAMES: StreamNames = StreamNames {
    trade: "aggTrade",
    funding_rate: Some("markPrice"),
};

/// Binance USD-M futures: every stream kind, aggregated trades
#[derive(Debug, Clone)]
pub struct BinanceFutures {
    endpoint: String,
}

impl BinanceFutures {
    pub fn new() -> Self {
        Self::with_endpoint(FUTURES_STREAM_URL)
    }

    /// Use a different stream endpoint (testnet).
    ///
    /// Raw `/ws` endpoints drop the stream name from depth payloads, so only
    /// the oldest depth subscription per symbol receives them there.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for BinanceFutures {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolAdapter for BinanceFutures {
    type Event = BinanceEvent;

    fn market(&self) -> Market {
        Market::Futures
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn session_key_endpoint(&self) -> SessionKeyEndpoint {
        SessionKeyEndpoint::FUTURES
    }

    fn supports(&self, _kind: StreamKind) -> bool {
        true
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
