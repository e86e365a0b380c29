/*
[INPUT]:  Channel keys and parsed channel names
[OUTPUT]: Binance stream names and their inverse mapping
[POS]:    Protocol layer - Binance channel naming shared by spot and futures
[UPDATE]: When stream names change per market
*/

use crate::error::{Result, StreamError};
use crate::types::{KlinePeriod, StreamKind};
use crate::ws::channel::{ChannelKey, ChannelName, ChannelParam};

/// Market-specific stream names
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamNames {
    pub trade: &'static str,
    pub funding_rate: Option<&'static str>,
}

pub(crate) fn channel_name(
    names: StreamNames,
    key: &ChannelKey,
    session_key: Option<&str>,
) -> Result<String> {
    if key.is_private() {
        return session_key
            .map(str::to_string)
            .ok_or_else(|| StreamError::SessionKey("no session key for private channel".to_string()));
    }

    let symbol = key
        .symbol
        .as_deref()
        .ok_or_else(|| StreamError::Decode(format!("channel {key} has no symbol")))?;

    let name = match (key.kind, &key.param) {
        (StreamKind::Depth, ChannelParam::Depth { level, speed }) => {
            ChannelName::new(symbol, "depth")
                .with_param(level.to_string())
                .with_speed(speed.clone())
        }
        (StreamKind::Kline, ChannelParam::Interval(period)) => {
            ChannelName::new(symbol, "kline").with_param(period.as_str())
        }
        (StreamKind::Ticker, ChannelParam::None) => ChannelName::new(symbol, "ticker"),
        (StreamKind::Trade, ChannelParam::None) => ChannelName::new(symbol, names.trade),
        (StreamKind::FundingRate, ChannelParam::None) => {
            let stream = names.funding_rate.ok_or_else(|| {
                StreamError::Decode(format!("no funding rate stream for {symbol}"))
            })?;
            ChannelName::new(symbol, stream)
        }
        _ => return Err(StreamError::Decode(format!("malformed channel key {key}"))),
    };
    Ok(name.to_string())
}

pub(crate) fn channel_key(names: StreamNames, name: &ChannelName) -> Option<ChannelKey> {
    let symbol = name.symbol.as_str();
    match (name.stream.as_str(), name.param.as_deref()) {
        ("depth", Some(level)) => {
            let level: u8 = level.parse().ok()?;
            if !matches!(level, 5 | 10 | 20) {
                return None;
            }
            let speed = name.speed.as_deref().unwrap_or(crate::ws::channel::DEFAULT_DEPTH_SPEED);
            Some(ChannelKey::depth(symbol, usize::from(level), Some(speed)))
        }
        ("kline", Some(interval)) => {
            let period: KlinePeriod = interval.parse().ok()?;
            Some(ChannelKey::kline(symbol, period))
        }
        ("ticker", None) => Some(ChannelKey::ticker(symbol)),
        (stream, None) if stream == names.trade => Some(ChannelKey::trade(symbol)),
        (stream, None) if Some(stream) == names.funding_rate => Some(ChannelKey::funding_rate(symbol)),
        _ => None,
    }
}
