/*
[INPUT]:  Instrument metadata and decoded stream payloads
[OUTPUT]: Domain events handed to subscription handlers
[POS]:    Data layer - event shapes independent of any exchange wire format
[UPDATE]: When adding event kinds or enriching event fields
*/

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{KlinePeriod, OrderStatus, OrderType, PositionSide, Side, StreamKind};

/// Static trading rules for one symbol, loaded from exchange info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMetadata {
    /// Upper-case exchange symbol, e.g. `BTCUSDT`
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_precision: u32,
    pub qty_precision: u32,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    /// `PERPETUAL`, `CURRENT_QUARTER`, ... (futures only)
    pub contract_type: Option<String>,
    pub delivery_date: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthItem {
    pub price: Decimal,
    pub amount: Decimal,
}

/// Order book snapshot or delta
#[derive(Debug, Clone, PartialEq)]
pub struct Depth {
    pub instrument: Arc<InstrumentMetadata>,
    /// Event time, epoch milliseconds
    pub timestamp: i64,
    /// Descending by price
    pub bids: Vec<DepthItem>,
    /// Ascending by price
    pub asks: Vec<DepthItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub instrument: Arc<InstrumentMetadata>,
    pub last: Decimal,
    /// Best bid
    pub buy: Decimal,
    /// Best ask
    pub sell: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub vol: Decimal,
    pub percent: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub instrument: Arc<InstrumentMetadata>,
    pub period: KlinePeriod,
    /// Candle open time
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub vol: Decimal,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub instrument: Arc<InstrumentMetadata>,
    pub id: String,
    pub price: Decimal,
    pub amount: Decimal,
    /// Taker side
    pub side: Side,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundingRate {
    pub instrument: Arc<InstrumentMetadata>,
    pub rate: Decimal,
    pub mark_price: Decimal,
    pub index_price: Option<Decimal>,
    pub next_funding_time: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub instrument: Arc<InstrumentMetadata>,
    pub id: String,
    pub client_id: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub executed_qty: Decimal,
    pub avg_price: Decimal,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument: Arc<InstrumentMetadata>,
    /// Signed quantity, negative when short in one-way mode
    pub qty: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub side: PositionSide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub asset: String,
    pub wallet_balance: Decimal,
    pub available_balance: Decimal,
    pub frozen: Decimal,
}

impl AccountBalance {
    pub fn new(asset: String, wallet_balance: Decimal, available_balance: Decimal) -> Self {
        Self {
            asset,
            wallet_balance,
            available_balance,
            frozen: wallet_balance - available_balance,
        }
    }
}

/// Fully mapped event, ready for a handler
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Depth(Depth),
    Ticker(Ticker),
    Kline(Kline),
    Trade(Trade),
    FundingRate(FundingRate),
    Order(Order),
    Positions(Vec<Position>),
    Account(Vec<AccountBalance>),
}

impl StreamEvent {
    pub fn kind(&self) -> StreamKind {
        match self {
            StreamEvent::Depth(_) => StreamKind::Depth,
            StreamEvent::Ticker(_) => StreamKind::Ticker,
            StreamEvent::Kline(_) => StreamKind::Kline,
            StreamEvent::Trade(_) => StreamKind::Trade,
            StreamEvent::FundingRate(_) => StreamKind::FundingRate,
            StreamEvent::Order(_) => StreamKind::Order,
            StreamEvent::Positions(_) => StreamKind::Position,
            StreamEvent::Account(_) => StreamKind::Account,
        }
    }
}
