/*
[INPUT]:  Raw Binance stream frames (spot and USD-M futures)
[OUTPUT]: Statically typed envelope and event payloads
[POS]:    Protocol layer - Binance wire schema
[UPDATE]: When Binance adds fields or event types
*/

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::types::serde_helpers::{deserialize_i64, deserialize_levels};
use crate::types::{KlinePeriod, OrderStatus, OrderType, PositionSide, Side};

/// Outer frame shape, tried in declaration order
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Combined { stream: String, data: Value },
    ErrorObject { error: ErrorBody, #[serde(default)] id: Option<Value> },
    ErrorCode { code: i64, msg: String },
    Ack { result: Value, id: Value },
    Event(DirectEvent),
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Events discriminated by their `e` field
#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
pub enum DirectEvent {
    #[serde(rename = "depthUpdate")]
    DepthUpdate(DepthUpdate),
    #[serde(rename = "24hrTicker")]
    Ticker(TickerEvent),
    #[serde(rename = "kline")]
    Kline(KlineEvent),
    #[serde(rename = "aggTrade")]
    AggTrade(AggTradeEvent),
    #[serde(rename = "trade")]
    Trade(TradeEvent),
    #[serde(rename = "markPriceUpdate")]
    MarkPrice(MarkPriceEvent),
    #[serde(rename = "ORDER_TRADE_UPDATE")]
    OrderTradeUpdate(OrderTradeUpdate),
    #[serde(rename = "ACCOUNT_UPDATE")]
    AccountUpdate(AccountUpdate),
    #[serde(rename = "executionReport")]
    ExecutionReport(ExecutionReport),
    #[serde(rename = "outboundAccountPosition")]
    OutboundAccountPosition(OutboundAccountPosition),
    #[serde(other)]
    Unknown,
}

impl DirectEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DirectEvent::DepthUpdate(_) => "depthUpdate",
            DirectEvent::Ticker(_) => "24hrTicker",
            DirectEvent::Kline(_) => "kline",
            DirectEvent::AggTrade(_) => "aggTrade",
            DirectEvent::Trade(_) => "trade",
            DirectEvent::MarkPrice(_) => "markPriceUpdate",
            DirectEvent::OrderTradeUpdate(_) => "ORDER_TRADE_UPDATE",
            DirectEvent::AccountUpdate(_) => "ACCOUNT_UPDATE",
            DirectEvent::ExecutionReport(_) => "executionReport",
            DirectEvent::OutboundAccountPosition(_) => "outboundAccountPosition",
            DirectEvent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DepthUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", deserialize_with = "deserialize_i64")]
    pub event_time: i64,
    #[serde(rename = "b", alias = "bids", deserialize_with = "deserialize_levels")]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(rename = "a", alias = "asks", deserialize_with = "deserialize_levels")]
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Spot partial book payload; only arrives inside a combined envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub last_update_id: i64,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(deserialize_with = "deserialize_levels")]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(deserialize_with = "deserialize_levels")]
    pub asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Deserialize)]
pub struct TickerEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub last: Decimal,
    /// Spot only; futures tickers carry no book top
    #[serde(rename = "b", default, with = "rust_decimal::serde::str_option")]
    pub best_bid: Option<Decimal>,
    #[serde(rename = "a", default, with = "rust_decimal::serde::str_option")]
    pub best_ask: Option<Decimal>,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(rename = "P", with = "rust_decimal::serde::str")]
    pub percent: Decimal,
    #[serde(rename = "C", deserialize_with = "deserialize_i64")]
    pub close_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
pub struct KlinePayload {
    #[serde(rename = "t", deserialize_with = "deserialize_i64")]
    pub start_time: i64,
    #[serde(rename = "i")]
    pub interval: KlinePeriod,
    #[serde(rename = "o", with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(rename = "x", default)]
    pub closed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AggTradeEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a", deserialize_with = "deserialize_i64")]
    pub agg_trade_id: i64,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(rename = "T", deserialize_with = "deserialize_i64")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

#[derive(Debug, Deserialize)]
pub struct TradeEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", deserialize_with = "deserialize_i64")]
    pub trade_id: i64,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(rename = "T", deserialize_with = "deserialize_i64")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

#[derive(Debug, Deserialize)]
pub struct MarkPriceEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", deserialize_with = "deserialize_i64")]
    pub event_time: i64,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub mark_price: Decimal,
    #[serde(rename = "i", default, with = "rust_decimal::serde::str_option")]
    pub index_price: Option<Decimal>,
    #[serde(rename = "r", with = "rust_decimal::serde::str")]
    pub funding_rate: Decimal,
    #[serde(rename = "T", deserialize_with = "deserialize_i64")]
    pub next_funding_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderTradeUpdate {
    #[serde(rename = "E", deserialize_with = "deserialize_i64")]
    pub event_time: i64,
    #[serde(rename = "o")]
    pub order: FuturesOrder,
}

#[derive(Debug, Deserialize)]
pub struct FuturesOrder {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_id: String,
    #[serde(rename = "i", deserialize_with = "deserialize_i64")]
    pub order_id: i64,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(rename = "z", with = "rust_decimal::serde::str")]
    pub executed_qty: Decimal,
    #[serde(rename = "ap", with = "rust_decimal::serde::str")]
    pub avg_price: Decimal,
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "o")]
    pub order_type: OrderType,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "T", deserialize_with = "deserialize_i64")]
    pub trade_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct AccountUpdate {
    #[serde(rename = "E", deserialize_with = "deserialize_i64")]
    pub event_time: i64,
    #[serde(rename = "a")]
    pub account: AccountPayload,
}

#[derive(Debug, Deserialize)]
pub struct AccountPayload {
    #[serde(rename = "B", default)]
    pub balances: Vec<FuturesBalance>,
    #[serde(rename = "P", default)]
    pub positions: Vec<FuturesPosition>,
}

#[derive(Debug, Deserialize)]
pub struct FuturesBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb", with = "rust_decimal::serde::str")]
    pub wallet_balance: Decimal,
    #[serde(rename = "cw", with = "rust_decimal::serde::str")]
    pub cross_wallet_balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct FuturesPosition {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa", with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(rename = "ep", with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(rename = "up", with = "rust_decimal::serde::str")]
    pub unrealized_pnl: Decimal,
    #[serde(rename = "ps")]
    pub side: PositionSide,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionReport {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_id: String,
    #[serde(rename = "i", deserialize_with = "deserialize_i64")]
    pub order_id: i64,
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "o")]
    pub order_type: OrderType,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(rename = "z", with = "rust_decimal::serde::str")]
    pub executed_qty: Decimal,
    /// Cumulative quote quantity
    #[serde(rename = "Z", with = "rust_decimal::serde::str")]
    pub executed_quote_qty: Decimal,
    #[serde(rename = "E", deserialize_with = "deserialize_i64")]
    pub event_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct OutboundAccountPosition {
    #[serde(rename = "E", deserialize_with = "deserialize_i64")]
    pub event_time: i64,
    #[serde(rename = "B", default)]
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Deserialize)]
pub struct SpotBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f", with = "rust_decimal::serde::str")]
    pub free: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub locked: Decimal,
}
