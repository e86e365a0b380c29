/*
[INPUT]:  Raw inbound frames, protocol adapter, registry, instrument cache
[OUTPUT]: Handler invocations, dispatch outcomes, sampled drop logs
[POS]:    WebSocket layer - classify, enrich and route every inbound frame
[UPDATE]: When adding frame kinds or changing drop/log policy
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};
use crate::protocol::{InboundFrame, ProtocolAdapter, Route};
use crate::types::InstrumentMetadata;
use crate::ws::registry::SubscriptionRegistry;

const DECODE_FAIL_LOG_LIMIT: usize = 3;
const UNKNOWN_SYMBOL_LOG_LIMIT: usize = 3;
const IGNORED_LOG_LIMIT: usize = 3;
const UNROUTED_LOG_LIMIT: usize = 5;
const RAW_LOG_MAX_BYTES: usize = 1024;

/// Symbol -> instrument metadata, keyed by upper-case symbol.
///
/// Replaced wholesale on every explicit connect; read-only in between.
#[derive(Debug, Default)]
pub struct InstrumentCache {
    instruments: RwLock<HashMap<String, Arc<InstrumentMetadata>>>,
}

impl InstrumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn replace(&self, instruments: HashMap<String, Arc<InstrumentMetadata>>) {
        let normalized = instruments
            .into_iter()
            .map(|(symbol, metadata)| (symbol.to_ascii_uppercase(), metadata))
            .collect();
        *self
            .instruments
            .write()
            .unwrap_or_else(PoisonError::into_inner) = normalized;
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<InstrumentMetadata>> {
        let guard = self.instruments.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&symbol.to_ascii_uppercase()).cloned()
    }

    /// Like `get`, failing with `UnknownSymbol`
    pub fn resolve(&self, symbol: &str) -> Result<Arc<InstrumentMetadata>> {
        self.get(symbol)
            .ok_or_else(|| StreamError::UnknownSymbol(symbol.to_ascii_uppercase()))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.get(symbol).is_some()
    }

    pub fn len(&self) -> usize {
        self.instruments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn symbols(&self) -> Vec<String> {
        let guard = self.instruments.read().unwrap_or_else(PoisonError::into_inner);
        let mut symbols: Vec<String> = guard.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

/// Logs the first `limit` occurrences of something, then goes quiet.
#[derive(Debug)]
pub struct LogSampler {
    count: AtomicUsize,
    limit: usize,
}

impl LogSampler {
    pub const fn new(limit: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            limit,
        }
    }

    /// 1-based sample index while under the limit
    pub fn sample(&self) -> Option<usize> {
        let count = self.count.fetch_add(1, Ordering::Relaxed);
        (count < self.limit).then_some(count + 1)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Occurrences seen so far, logged or not
    pub fn seen(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Number of handlers invoked
    Delivered(usize),
    /// Decoded and mapped, but no handler registered for it
    Unhandled,
    Acknowledged,
    /// Exchange error frame
    Rejected { code: i64, message: String },
    Ignored,
    UnknownSymbol,
    DecodeFailed,
}

/// Per-client frame dispatcher
#[derive(Debug)]
pub struct Dispatcher<A: ProtocolAdapter> {
    adapter: Arc<A>,
    registry: Arc<SubscriptionRegistry>,
    instruments: Arc<InstrumentCache>,
    decode_failures: LogSampler,
    unknown_symbols: LogSampler,
    ignored: LogSampler,
    unrouted: LogSampler,
}

impl<A: ProtocolAdapter> Dispatcher<A> {
    pub fn new(
        adapter: Arc<A>,
        registry: Arc<SubscriptionRegistry>,
        instruments: Arc<InstrumentCache>,
    ) -> Self {
        Self {
            adapter,
            registry,
            instruments,
            decode_failures: LogSampler::new(DECODE_FAIL_LOG_LIMIT),
            unknown_symbols: LogSampler::new(UNKNOWN_SYMBOL_LOG_LIMIT),
            ignored: LogSampler::new(IGNORED_LOG_LIMIT),
            unrouted: LogSampler::new(UNROUTED_LOG_LIMIT),
        }
    }

    /// Handle one frame. Never fails: bad input is logged and dropped.
    pub fn dispatch(&self, raw: &[u8]) -> DispatchOutcome {
        let frame = match self.adapter.classify_frame(raw) {
            Ok(frame) => frame,
            Err(err) => {
                self.log_decode_failure(&err, raw);
                return DispatchOutcome::DecodeFailed;
            }
        };

        match frame {
            InboundFrame::Event(event) => self.route(event, raw),
            InboundFrame::Ack { id } => {
                debug!(id = id.as_deref().unwrap_or(""), "ws subscription acknowledged");
                DispatchOutcome::Acknowledged
            }
            InboundFrame::Error { code, message } => {
                warn!(code, message = %message, "ws error frame");
                DispatchOutcome::Rejected { code, message }
            }
            InboundFrame::Ignored { event_type } => {
                if let Some(index) = self.ignored.sample() {
                    info!(
                        sample_index = index,
                        sample_limit = self.ignored.limit(),
                        event_type = %event_type,
                        bytes = raw.len(),
                        "ws message channel unrecognized"
                    );
                }
                DispatchOutcome::Ignored
            }
        }
    }

    fn route(&self, event: A::Event, raw: &[u8]) -> DispatchOutcome {
        let routed = match self.adapter.map_event(event, &self.instruments) {
            Ok(routed) => routed,
            Err(StreamError::UnknownSymbol(symbol)) => {
                if let Some(index) = self.unknown_symbols.sample() {
                    warn!(
                        sample_index = index,
                        sample_limit = self.unknown_symbols.limit(),
                        symbol = %symbol,
                        "ws event for unknown symbol dropped"
                    );
                }
                return DispatchOutcome::UnknownSymbol;
            }
            Err(err) => {
                self.log_decode_failure(&err, raw);
                return DispatchOutcome::DecodeFailed;
            }
        };

        let mut delivered = 0;
        for routed_event in routed {
            let handler = match &routed_event.route {
                Route::Key(key) => self.registry.lookup(key),
                Route::FirstOf { kind, symbol } => self
                    .registry
                    .lookup_stream(*kind, symbol)
                    .map(|(_, handler)| handler),
            };
            let Some(handler) = handler else {
                if let Some(index) = self.unrouted.sample() {
                    debug!(
                        sample_index = index,
                        sample_limit = self.unrouted.limit(),
                        route = ?routed_event.route,
                        "ws event has no registered handler"
                    );
                }
                continue;
            };
            if handler.invoke(&routed_event.event) {
                delivered += 1;
            } else {
                warn!(
                    handler = ?handler,
                    event = %routed_event.event.kind(),
                    "ws handler kind mismatch"
                );
            }
        }

        if delivered == 0 {
            DispatchOutcome::Unhandled
        } else {
            DispatchOutcome::Delivered(delivered)
        }
    }

    fn log_decode_failure(&self, err: &StreamError, raw: &[u8]) {
        let Some(index) = self.decode_failures.sample() else {
            return;
        };
        warn!(
            sample_index = index,
            sample_limit = self.decode_failures.limit(),
            error = %err,
            bytes = raw.len(),
            "ws message parse failed"
        );
        let preview = truncate_for_log(&String::from_utf8_lossy(raw), RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = index,
            sample_limit = self.decode_failures.limit(),
            message = %preview,
            "ws message parse failed"
        );
    }
}

fn truncate_for_log(raw: &str, max_bytes: usize) -> String {
    if raw.len() <= max_bytes {
        return raw.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !raw.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = raw[..end].to_string();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sampler_stops_at_limit() {
        let sampler = LogSampler::new(2);
        assert_eq!(sampler.sample(), Some(1));
        assert_eq!(sampler.sample(), Some(2));
        assert_eq!(sampler.sample(), None);
        assert_eq!(sampler.seen(), 3);
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("abcdef", 3), "abc...");
        assert_eq!(truncate_for_log("ééé", 3), "é...");
    }

    #[test]
    fn test_instrument_cache_is_case_insensitive() {
        let cache = InstrumentCache::new();
        let metadata = Arc::new(InstrumentMetadata {
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            price_precision: 2,
            qty_precision: 3,
            min_qty: Default::default(),
            max_qty: Default::default(),
            contract_type: None,
            delivery_date: None,
        });
        cache.replace(HashMap::from([("btcusdt".to_string(), metadata)]));

        assert!(cache.contains("BTCUSDT"));
        assert_eq!(cache.resolve("btcusdt").unwrap().base_asset, "BTC");
        assert!(matches!(
            cache.resolve("ethusdt"),
            Err(StreamError::UnknownSymbol(symbol)) if symbol == "ETHUSDT"
        ));
        assert_eq!(cache.symbols(), vec!["BTCUSDT".to_string()]);
    }
}
