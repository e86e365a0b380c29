/*
[INPUT]:  Raw Binance frames, instrument cache
[OUTPUT]: Classified frames and routed domain events for spot and futures
[POS]:    Protocol layer - logic shared by both Binance adapters
[UPDATE]: When a Binance event type is added or its mapping changes
*/

pub mod futures;
pub mod messages;
pub mod spot;
mod streams;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::protocol::{InboundFrame, Route, RoutedEvent};
use crate::types::{
    AccountBalance, Depth, DepthItem, FundingRate, Kline, Order, Position, Side, StreamEvent,
    StreamKind, Ticker, Trade,
};
use crate::ws::channel::{ChannelKey, ChannelName};
use crate::ws::dispatcher::InstrumentCache;

use messages::{BookSnapshot, DirectEvent, Envelope};
use streams::StreamNames;

pub use futures::BinanceFutures;
pub use spot::BinanceSpot;

/// Decoded Binance frame awaiting enrichment
#[derive(Debug)]
pub struct BinanceEvent {
    /// Channel name from a combined envelope, when it follows the channel grammar
    pub stream: Option<ChannelName>,
    pub payload: Payload,
}

#[derive(Debug)]
pub enum Payload {
    Direct(DirectEvent),
    /// Partial book without event discriminator or symbol
    Book { symbol: String, snapshot: BookSnapshot },
}

fn decode_error(err: serde_json::Error) -> StreamError {
    StreamError::Decode(err.to_string())
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn classify(raw: &[u8]) -> Result<InboundFrame<BinanceEvent>> {
    let envelope: Envelope = match serde_json::from_slice(raw) {
        Ok(envelope) => envelope,
        // The untagged error says nothing useful; the event decode error does.
        Err(err) => {
            let detail = serde_json::from_slice::<DirectEvent>(raw).err().unwrap_or(err);
            return Err(decode_error(detail));
        }
    };
    let frame = match envelope {
        Envelope::Combined { stream, data } => {
            let name = stream.parse::<ChannelName>().ok();
            if data.get("e").is_some() {
                let event = DirectEvent::deserialize(data).map_err(decode_error)?;
                direct(name, event)
            } else if let Some(name) = name.filter(|name| name.stream == "depth") {
                let snapshot = BookSnapshot::deserialize(data).map_err(decode_error)?;
                InboundFrame::Event(BinanceEvent {
                    payload: Payload::Book {
                        symbol: name.symbol.clone(),
                        snapshot,
                    },
                    stream: Some(name),
                })
            } else {
                InboundFrame::Ignored { event_type: stream }
            }
        }
        Envelope::ErrorObject { error, .. } => InboundFrame::Error {
            code: error.code,
            message: error.msg,
        },
        Envelope::ErrorCode { code, msg } => InboundFrame::Error { code, message: msg },
        Envelope::Ack { id, .. } => InboundFrame::Ack {
            id: Some(id_string(&id)),
        },
        Envelope::Event(event) => direct(None, event),
    };
    Ok(frame)
}

fn direct(stream: Option<ChannelName>, event: DirectEvent) -> InboundFrame<BinanceEvent> {
    match event {
        DirectEvent::Unknown => InboundFrame::Ignored {
            event_type: "unknown".to_string(),
        },
        event => InboundFrame::Event(BinanceEvent {
            stream,
            payload: Payload::Direct(event),
        }),
    }
}

fn levels(levels: Vec<(Decimal, Decimal)>) -> Vec<DepthItem> {
    levels
        .into_iter()
        .map(|(price, amount)| DepthItem { price, amount })
        .collect()
}

fn taker_side(buyer_is_maker: bool) -> Side {
    if buyer_is_maker { Side::Sell } else { Side::Buy }
}

fn lower(symbol: &str) -> String {
    symbol.to_ascii_lowercase()
}

pub(crate) fn map_event(
    names: StreamNames,
    event: BinanceEvent,
    instruments: &InstrumentCache,
) -> Result<Vec<RoutedEvent>> {
    let exact = event
        .stream
        .as_ref()
        .and_then(|name| streams::channel_key(names, name));
    let route_or = |fallback: Route| exact.clone().map(Route::Key).unwrap_or(fallback);

    let routed = match event.payload {
        Payload::Book { symbol, snapshot } => {
            let depth = Depth {
                instrument: instruments.resolve(&symbol)?,
                timestamp: snapshot
                    .event_time
                    .unwrap_or_else(|| Utc::now().timestamp_millis()),
                bids: levels(snapshot.bids),
                asks: levels(snapshot.asks),
            };
            vec![RoutedEvent::new(
                route_or(Route::FirstOf {
                    kind: StreamKind::Depth,
                    symbol: lower(&symbol),
                }),
                StreamEvent::Depth(depth),
            )]
        }
        Payload::Direct(DirectEvent::DepthUpdate(update)) => {
            let depth = Depth {
                instrument: instruments.resolve(&update.symbol)?,
                timestamp: update.event_time,
                bids: levels(update.bids),
                asks: levels(update.asks),
            };
            vec![RoutedEvent::new(
                route_or(Route::FirstOf {
                    kind: StreamKind::Depth,
                    symbol: lower(&update.symbol),
                }),
                StreamEvent::Depth(depth),
            )]
        }
        Payload::Direct(DirectEvent::Ticker(ticker)) => {
            let mapped = Ticker {
                instrument: instruments.resolve(&ticker.symbol)?,
                last: ticker.last,
                buy: ticker.best_bid.unwrap_or_default(),
                sell: ticker.best_ask.unwrap_or_default(),
                high: ticker.high,
                low: ticker.low,
                vol: ticker.volume,
                percent: ticker.percent,
                timestamp: ticker.close_time,
            };
            vec![RoutedEvent::new(
                route_or(Route::Key(ChannelKey::ticker(&ticker.symbol))),
                StreamEvent::Ticker(mapped),
            )]
        }
        Payload::Direct(DirectEvent::Kline(event)) => {
            let k = event.kline;
            let mapped = Kline {
                instrument: instruments.resolve(&event.symbol)?,
                period: k.interval,
                timestamp: k.start_time,
                open: k.open,
                high: k.high,
                low: k.low,
                close: k.close,
                vol: k.volume,
                closed: k.closed,
            };
            vec![RoutedEvent::new(
                route_or(Route::Key(ChannelKey::kline(&event.symbol, k.interval))),
                StreamEvent::Kline(mapped),
            )]
        }
        Payload::Direct(DirectEvent::AggTrade(trade)) => {
            let mapped = Trade {
                instrument: instruments.resolve(&trade.symbol)?,
                id: trade.agg_trade_id.to_string(),
                price: trade.price,
                amount: trade.qty,
                side: taker_side(trade.buyer_is_maker),
                timestamp: trade.trade_time,
            };
            vec![RoutedEvent::new(
                route_or(Route::Key(ChannelKey::trade(&trade.symbol))),
                StreamEvent::Trade(mapped),
            )]
        }
        Payload::Direct(DirectEvent::Trade(trade)) => {
            let mapped = Trade {
                instrument: instruments.resolve(&trade.symbol)?,
                id: trade.trade_id.to_string(),
                price: trade.price,
                amount: trade.qty,
                side: taker_side(trade.buyer_is_maker),
                timestamp: trade.trade_time,
            };
            vec![RoutedEvent::new(
                route_or(Route::Key(ChannelKey::trade(&trade.symbol))),
                StreamEvent::Trade(mapped),
            )]
        }
        Payload::Direct(DirectEvent::MarkPrice(mark)) => {
            let mapped = FundingRate {
                instrument: instruments.resolve(&mark.symbol)?,
                rate: mark.funding_rate,
                mark_price: mark.mark_price,
                index_price: mark.index_price,
                next_funding_time: mark.next_funding_time,
                timestamp: mark.event_time,
            };
            vec![RoutedEvent::new(
                route_or(Route::Key(ChannelKey::funding_rate(&mark.symbol))),
                StreamEvent::FundingRate(mapped),
            )]
        }
        Payload::Direct(DirectEvent::OrderTradeUpdate(update)) => {
            let o = update.order;
            let order = Order {
                instrument: instruments.resolve(&o.symbol)?,
                id: o.order_id.to_string(),
                client_id: o.client_id,
                price: o.price,
                qty: o.qty,
                executed_qty: o.executed_qty,
                avg_price: o.avg_price,
                side: o.side,
                order_type: o.order_type,
                status: o.status,
                timestamp: o.trade_time,
            };
            vec![RoutedEvent::new(
                Route::Key(ChannelKey::private(StreamKind::Order)),
                StreamEvent::Order(order),
            )]
        }
        Payload::Direct(DirectEvent::ExecutionReport(report)) => {
            let avg_price = if report.executed_qty.is_zero() {
                Decimal::ZERO
            } else {
                report
                    .executed_quote_qty
                    .checked_div(report.executed_qty)
                    .unwrap_or(Decimal::ZERO)
            };
            let order = Order {
                instrument: instruments.resolve(&report.symbol)?,
                id: report.order_id.to_string(),
                client_id: report.client_id,
                price: report.price,
                qty: report.qty,
                executed_qty: report.executed_qty,
                avg_price,
                side: report.side,
                order_type: report.order_type,
                status: report.status,
                timestamp: report.event_time,
            };
            vec![RoutedEvent::new(
                Route::Key(ChannelKey::private(StreamKind::Order)),
                StreamEvent::Order(order),
            )]
        }
        Payload::Direct(DirectEvent::AccountUpdate(update)) => {
            let mut routed = Vec::with_capacity(2);

            let positions: Vec<Position> = update
                .account
                .positions
                .into_iter()
                .filter_map(|position| match instruments.resolve(&position.symbol) {
                    Ok(instrument) => Some(Position {
                        instrument,
                        qty: position.amount,
                        entry_price: position.entry_price,
                        unrealized_pnl: position.unrealized_pnl,
                        side: position.side,
                    }),
                    Err(_) => {
                        debug!(symbol = %position.symbol, "position for unknown symbol skipped");
                        None
                    }
                })
                .collect();
            if !positions.is_empty() {
                routed.push(RoutedEvent::new(
                    Route::Key(ChannelKey::private(StreamKind::Position)),
                    StreamEvent::Positions(positions),
                ));
            }

            let balances: Vec<AccountBalance> = update
                .account
                .balances
                .into_iter()
                .map(|balance| {
                    AccountBalance::new(
                        balance.asset,
                        balance.wallet_balance,
                        balance.cross_wallet_balance,
                    )
                })
                .collect();
            if !balances.is_empty() {
                routed.push(RoutedEvent::new(
                    Route::Key(ChannelKey::private(StreamKind::Account)),
                    StreamEvent::Account(balances),
                ));
            }
            routed
        }
        Payload::Direct(DirectEvent::OutboundAccountPosition(update)) => {
            let balances: Vec<AccountBalance> = update
                .balances
                .into_iter()
                .map(|balance| {
                    AccountBalance::new(balance.asset, balance.free + balance.locked, balance.free)
                })
                .collect();
            vec![RoutedEvent::new(
                Route::Key(ChannelKey::private(StreamKind::Account)),
                StreamEvent::Account(balances),
            )]
        }
        Payload::Direct(DirectEvent::Unknown) => Vec::new(),
    };
    Ok(routed)
}
