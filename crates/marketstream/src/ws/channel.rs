/*
[INPUT]:  Stream kind, symbol and auxiliary parameters
[OUTPUT]: Normalized channel keys, channel-string grammar, control messages
[POS]:    WebSocket layer - subscription identity and wire control frames
[UPDATE]: When the channel naming convention or control message shape changes
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StreamError};
use crate::types::{KlinePeriod, StreamKind};

pub const DEFAULT_DEPTH_SPEED: &str = "100ms";

/// Partial book depth levels offered by the exchange
pub fn depth_level(size: usize) -> u8 {
    match size {
        0..=5 => 5,
        6..=10 => 10,
        _ => 20,
    }
}

/// Auxiliary part of a channel identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelParam {
    None,
    Depth { level: u8, speed: String },
    Interval(KlinePeriod),
}

/// Identity of one subscription: at most one handler per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub kind: StreamKind,
    /// Lower-case symbol; `None` for account-scoped kinds
    pub symbol: Option<String>,
    pub param: ChannelParam,
}

impl ChannelKey {
    fn public(kind: StreamKind, symbol: &str, param: ChannelParam) -> Self {
        Self {
            kind,
            symbol: Some(symbol.to_ascii_lowercase()),
            param,
        }
    }

    pub fn depth(symbol: &str, size: usize, speed: Option<&str>) -> Self {
        Self::public(
            StreamKind::Depth,
            symbol,
            ChannelParam::Depth {
                level: depth_level(size),
                speed: speed.unwrap_or(DEFAULT_DEPTH_SPEED).to_string(),
            },
        )
    }

    pub fn ticker(symbol: &str) -> Self {
        Self::public(StreamKind::Ticker, symbol, ChannelParam::None)
    }

    pub fn kline(symbol: &str, period: KlinePeriod) -> Self {
        Self::public(StreamKind::Kline, symbol, ChannelParam::Interval(period))
    }

    pub fn trade(symbol: &str) -> Self {
        Self::public(StreamKind::Trade, symbol, ChannelParam::None)
    }

    pub fn funding_rate(symbol: &str) -> Self {
        Self::public(StreamKind::FundingRate, symbol, ChannelParam::None)
    }

    /// Key for an account-scoped kind (order, position, account)
    pub fn private(kind: StreamKind) -> Self {
        Self {
            kind,
            symbol: None,
            param: ChannelParam::None,
        }
    }

    pub fn is_private(&self) -> bool {
        self.kind.is_private()
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(symbol) = &self.symbol {
            write!(f, ":{symbol}")?;
        }
        match &self.param {
            ChannelParam::None => Ok(()),
            ChannelParam::Depth { level, speed } => write!(f, ":{level}@{speed}"),
            ChannelParam::Interval(period) => write!(f, ":{period}"),
        }
    }
}

/// Parsed channel string: `<symbol>@<stream>[<param>][@<speed>]`
///
/// `depth` takes its level as a bare suffix (`depth20`), `kline` takes its
/// interval after an underscore (`kline_1m`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName {
    pub symbol: String,
    pub stream: String,
    pub param: Option<String>,
    pub speed: Option<String>,
}

impl ChannelName {
    pub fn new(symbol: &str, stream: &str) -> Self {
        Self {
            symbol: symbol.to_ascii_lowercase(),
            stream: stream.to_string(),
            param: None,
            speed: None,
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn with_speed(mut self, speed: impl Into<String>) -> Self {
        self.speed = Some(speed.into());
        self
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.stream)?;
        if let Some(param) = &self.param {
            if self.stream == "kline" {
                write!(f, "_{param}")?;
            } else {
                f.write_str(param)?;
            }
        }
        if let Some(speed) = &self.speed {
            write!(f, "@{speed}")?;
        }
        Ok(())
    }
}

impl FromStr for ChannelName {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StreamError::Decode(format!("invalid channel name: {s}"));

        let mut parts = s.split('@');
        let symbol = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let stream_part = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let speed = parts.next().map(str::to_string);
        if parts.next().is_some() || speed.as_deref() == Some("") {
            return Err(invalid());
        }
        if symbol.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid());
        }

        let (stream, param) = if let Some(interval) = stream_part.strip_prefix("kline_") {
            ("kline", Some(interval.to_string()))
        } else if let Some(level) = stream_part
            .strip_prefix("depth")
            .filter(|level| !level.is_empty() && level.chars().all(|c| c.is_ascii_digit()))
        {
            ("depth", Some(level.to_string()))
        } else {
            (stream_part, None)
        };

        Ok(Self {
            symbol: symbol.to_string(),
            stream: stream.to_string(),
            param,
            speed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMethod {
    Subscribe,
    Unsubscribe,
}

impl ControlMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMethod::Subscribe => "SUBSCRIBE",
            ControlMethod::Unsubscribe => "UNSUBSCRIBE",
        }
    }
}

/// `{"method": "SUBSCRIBE", "params": ["btcusdt@ticker"], "id": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub method: ControlMethod,
    pub params: Vec<String>,
    pub id: String,
}

impl ControlMessage {
    pub fn new(method: ControlMethod, params: Vec<String>) -> Self {
        Self {
            method,
            params,
            id: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 5)]
    #[case(5, 5)]
    #[case(6, 10)]
    #[case(10, 10)]
    #[case(11, 20)]
    #[case(500, 20)]
    fn test_depth_level(#[case] size: usize, #[case] level: u8) {
        assert_eq!(depth_level(size), level);
    }

    #[rstest]
    #[case("btcusdt@depth20@100ms", "depth", Some("20"), Some("100ms"))]
    #[case("btcusdt@depth5", "depth", Some("5"), None)]
    #[case("btcusdt@kline_1m", "kline", Some("1m"), None)]
    #[case("btcusdt@kline_1M", "kline", Some("1M"), None)]
    #[case("btcusdt@aggTrade", "aggTrade", None, None)]
    #[case("btcusdt@markPrice", "markPrice", None, None)]
    #[case("btcusdt@depthUpdate", "depthUpdate", None, None)]
    fn test_channel_name_round_trip(
        #[case] raw: &str,
        #[case] stream: &str,
        #[case] param: Option<&str>,
        #[case] speed: Option<&str>,
    ) {
        let name: ChannelName = raw.parse().unwrap();
        assert_eq!(name.symbol, "btcusdt");
        assert_eq!(name.stream, stream);
        assert_eq!(name.param.as_deref(), param);
        assert_eq!(name.speed.as_deref(), speed);
        assert_eq!(name.to_string(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("btcusdt")]
    #[case("@ticker")]
    #[case("BTCUSDT@ticker")]
    #[case("btcusdt@depth20@100ms@extra")]
    #[case("btcusdt@ticker@")]
    fn test_channel_name_rejects_malformed(#[case] raw: &str) {
        assert!(raw.parse::<ChannelName>().is_err());
    }

    #[test]
    fn test_channel_key_normalizes_symbol() {
        let key = ChannelKey::depth("BTCUSDT", 7, None);
        assert_eq!(key.symbol.as_deref(), Some("btcusdt"));
        assert_eq!(
            key.param,
            ChannelParam::Depth {
                level: 10,
                speed: "100ms".to_string()
            }
        );
        assert_eq!(key, ChannelKey::depth("btcusdt", 10, Some("100ms")));
        assert!(!key.is_private());
        assert!(ChannelKey::private(StreamKind::Order).is_private());
    }

    #[test]
    fn test_control_message_wire_shape() {
        let message = ControlMessage::new(
            ControlMethod::Subscribe,
            vec!["btcusdt@kline_1m".to_string()],
        );
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["params"][0], "btcusdt@kline_1m");
        assert_eq!(value["id"].as_str().unwrap().len(), 32);
    }
}
