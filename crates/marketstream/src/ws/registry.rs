/*
[INPUT]:  Channel keys and caller-supplied handler closures
[OUTPUT]: Concurrent key -> handler map, ordered snapshots for replay
[POS]:    WebSocket layer - source of truth for what should be live
[UPDATE]: When adding stream kinds or changing replay order
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{
    AccountBalance, Depth, FundingRate, Kline, Order, Position, StreamEvent, StreamKind, Ticker,
    Trade,
};
use crate::ws::channel::ChannelKey;

/// Typed handler closure, one variant per stream kind
#[derive(Clone)]
pub enum Handler {
    Depth(Arc<dyn Fn(&Depth) + Send + Sync>),
    Ticker(Arc<dyn Fn(&Ticker) + Send + Sync>),
    Kline(Arc<dyn Fn(&Kline) + Send + Sync>),
    Trade(Arc<dyn Fn(&Trade) + Send + Sync>),
    FundingRate(Arc<dyn Fn(&FundingRate) + Send + Sync>),
    Order(Arc<dyn Fn(&Order) + Send + Sync>),
    Positions(Arc<dyn Fn(&[Position]) + Send + Sync>),
    Account(Arc<dyn Fn(&[AccountBalance]) + Send + Sync>),
}

impl Handler {
    pub fn kind(&self) -> StreamKind {
        match self {
            Handler::Depth(_) => StreamKind::Depth,
            Handler::Ticker(_) => StreamKind::Ticker,
            Handler::Kline(_) => StreamKind::Kline,
            Handler::Trade(_) => StreamKind::Trade,
            Handler::FundingRate(_) => StreamKind::FundingRate,
            Handler::Order(_) => StreamKind::Order,
            Handler::Positions(_) => StreamKind::Position,
            Handler::Account(_) => StreamKind::Account,
        }
    }

    /// Invoke with `event`; returns `false` when the kinds do not match.
    pub fn invoke(&self, event: &StreamEvent) -> bool {
        match (self, event) {
            (Handler::Depth(handler), StreamEvent::Depth(depth)) => handler(depth),
            (Handler::Ticker(handler), StreamEvent::Ticker(ticker)) => handler(ticker),
            (Handler::Kline(handler), StreamEvent::Kline(kline)) => handler(kline),
            (Handler::Trade(handler), StreamEvent::Trade(trade)) => handler(trade),
            (Handler::FundingRate(handler), StreamEvent::FundingRate(rate)) => handler(rate),
            (Handler::Order(handler), StreamEvent::Order(order)) => handler(order),
            (Handler::Positions(handler), StreamEvent::Positions(positions)) => handler(positions.as_slice()),
            (Handler::Account(handler), StreamEvent::Account(balances)) => handler(balances.as_slice()),
            _ => return false,
        }
        true
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({})", self.kind())
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    handler: Handler,
}

/// Reader/writer guarded channel registry.
///
/// Handlers are cloned out before being invoked, so no lock is held while
/// caller code runs.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<ChannelKey, Entry>>,
    next_seq: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`, replacing any previous handler for the same key.
    ///
    /// A replaced entry keeps its original registry position.
    pub fn put(&self, key: ChannelKey, handler: Handler) -> Option<Handler> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&key) {
            return Some(std::mem::replace(&mut entry.handler, handler));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(key, Entry { seq, handler });
        None
    }

    pub fn remove(&self, key: &ChannelKey) -> Option<Handler> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key).map(|entry| entry.handler)
    }

    pub fn lookup(&self, key: &ChannelKey) -> Option<Handler> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map(|entry| entry.handler.clone())
    }

    /// First entry, in registry order, for `kind` on `symbol`.
    ///
    /// Used for events whose payload does not carry the full key (direct depth updates).
    pub fn lookup_stream(&self, kind: StreamKind, symbol: &str) -> Option<(ChannelKey, Handler)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|(key, _)| key.kind == kind && key.symbol.as_deref() == Some(symbol))
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(key, entry)| (key.clone(), entry.handler.clone()))
    }

    /// All live entries in registry order
    pub fn snapshot(&self) -> Vec<(ChannelKey, Handler)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ordered: Vec<_> = entries
            .iter()
            .map(|(key, entry)| (entry.seq, key.clone(), entry.handler.clone()))
            .collect();
        ordered.sort_by_key(|(seq, _, _)| *seq);
        ordered
            .into_iter()
            .map(|(_, key, handler)| (key, handler))
            .collect()
    }

    pub fn has_private(&self) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().any(ChannelKey::is_private)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
