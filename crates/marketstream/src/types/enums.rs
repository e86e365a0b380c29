/*
[INPUT]:  Exchange enum encodings and stream taxonomy
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - shared enum definitions
[UPDATE]: When the exchange adds enum values or new stream kinds appear
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Market a client instance is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Spot,
    Futures,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Spot => "spot",
            Market::Futures => "futures",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical stream kinds multiplexed over one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Depth,
    Ticker,
    Kline,
    Trade,
    FundingRate,
    Order,
    Position,
    Account,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Depth => "depth",
            StreamKind::Ticker => "ticker",
            StreamKind::Kline => "kline",
            StreamKind::Trade => "trade",
            StreamKind::FundingRate => "funding_rate",
            StreamKind::Order => "order",
            StreamKind::Position => "position",
            StreamKind::Account => "account",
        }
    }

    /// Account-scoped kinds ride on the session key channel.
    pub fn is_private(&self) -> bool {
        matches!(
            self,
            StreamKind::Order | StreamKind::Position | StreamKind::Account
        )
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopMarket,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitMarket,
    TakeProfitLimit,
    TrailingStopMarket,
    LimitMaker,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    ExpiredInMatch,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// No further updates follow a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
                | OrderStatus::ExpiredInMatch
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

/// Candle interval, serialized as the exchange interval code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlinePeriod {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "3m")]
    Min3,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "6h")]
    Hour6,
    #[serde(rename = "8h")]
    Hour8,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "3d")]
    Day3,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl KlinePeriod {
    pub const ALL: [KlinePeriod; 15] = [
        KlinePeriod::Min1,
        KlinePeriod::Min3,
        KlinePeriod::Min5,
        KlinePeriod::Min15,
        KlinePeriod::Min30,
        KlinePeriod::Hour1,
        KlinePeriod::Hour2,
        KlinePeriod::Hour4,
        KlinePeriod::Hour6,
        KlinePeriod::Hour8,
        KlinePeriod::Hour12,
        KlinePeriod::Day1,
        KlinePeriod::Day3,
        KlinePeriod::Week1,
        KlinePeriod::Month1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KlinePeriod::Min1 => "1m",
            KlinePeriod::Min3 => "3m",
            KlinePeriod::Min5 => "5m",
            KlinePeriod::Min15 => "15m",
            KlinePeriod::Min30 => "30m",
            KlinePeriod::Hour1 => "1h",
            KlinePeriod::Hour2 => "2h",
            KlinePeriod::Hour4 => "4h",
            KlinePeriod::Hour6 => "6h",
            KlinePeriod::Hour8 => "8h",
            KlinePeriod::Hour12 => "12h",
            KlinePeriod::Day1 => "1d",
            KlinePeriod::Day3 => "3d",
            KlinePeriod::Week1 => "1w",
            KlinePeriod::Month1 => "1M",
        }
    }
}

impl fmt::Display for KlinePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KlinePeriod {
    type Err = String;

    // Interval codes are case-sensitive: "1m" is a minute, "1M" a month.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KlinePeriod::ALL
            .iter()
            .copied()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| format!("unknown kline interval: {s}"))
    }
}
