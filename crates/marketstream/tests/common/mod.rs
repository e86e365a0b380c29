/*
[INPUT]:  Test configuration and mock collaborator requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for marketstream tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use marketstream::rest::exchange_info::parse_exchange_info;
use marketstream::ws::{Frame, MockPeer};
use marketstream::{
    ExchangeInfo, MockTransport, ProtocolAdapter, ReconnectPolicy, RestCollaborator, Result,
    SessionKeyConfig, StreamClient, StreamConfig, StreamError,
};
use reqwest::Method;
use serde_json::Value;

pub const EXCHANGE_INFO: &str = r#"{
    "symbols": [
        {
            "symbol": "BTCUSDT",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "contractType": "PERPETUAL",
            "pricePrecision": 2,
            "quantityPrecision": 3,
            "filters": [
                {"filterType": "LOT_SIZE", "minQty": "0.001", "maxQty": "1000", "stepSize": "0.001"}
            ]
        },
        {
            "symbol": "ETHUSDT",
            "baseAsset": "ETH",
            "quoteAsset": "USDT",
            "contractType": "PERPETUAL",
            "pricePrecision": 2,
            "quantityPrecision": 3,
            "filters": []
        },
        {
            "symbol": "BNBBTC",
            "baseAsset": "BNB",
            "quoteAsset": "BTC",
            "baseAssetPrecision": 8,
            "quotePrecision": 8,
            "filters": []
        }
    ]
}"#;

/// One authenticated call seen by [`MockRest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: Method,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

/// In-memory REST collaborator serving [`EXCHANGE_INFO`] and listen keys
#[derive(Debug, Default)]
pub struct MockRest {
    credentials: bool,
    fail_exchange_info: AtomicBool,
    exchange_info_calls: AtomicUsize,
    mints: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockRest {
    pub fn public() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_credentials() -> Arc<Self> {
        Arc::new(Self {
            credentials: true,
            ..Self::default()
        })
    }

    pub fn fail_exchange_info(&self, fail: bool) {
        self.fail_exchange_info.store(fail, Ordering::SeqCst);
    }

    pub fn exchange_info_calls(&self) -> usize {
        self.exchange_info_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }
}

#[async_trait]
impl RestCollaborator for MockRest {
    async fn exchange_info(&self) -> Result<ExchangeInfo> {
        self.exchange_info_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange_info.load(Ordering::SeqCst) {
            return Err(StreamError::Transport("exchange info unavailable".to_string()));
        }
        Ok(ExchangeInfo {
            instruments: parse_exchange_info(EXCHANGE_INFO.as_bytes())?,
            raw: EXCHANGE_INFO.as_bytes().to_vec(),
        })
    }

    async fn authenticated_request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        _headers: &[(&str, &str)],
    ) -> Result<Vec<u8>> {
        if !self.credentials {
            return Err(StreamError::AuthRequired);
        }
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.clone(),
            endpoint: endpoint.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        if method == Method::POST {
            let n = self.mints.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(format!(r#"{{"listenKey":"listen-key-{n}"}}"#).into_bytes());
        }
        Ok(b"{}".to_vec())
    }

    fn has_credentials(&self) -> bool {
        self.credentials
    }
}

/// Timings that keep heartbeats and read deadlines out of the way
pub fn quiet_config() -> StreamConfig {
    StreamConfig {
        ping_interval: Duration::from_secs(300),
        read_timeout: Duration::from_secs(600),
        write_timeout: Duration::from_secs(1),
        handshake_timeout: Duration::from_secs(1),
        reconnect: ReconnectPolicy {
            enabled: false,
            ..ReconnectPolicy::default()
        },
    }
}

pub fn reconnecting_config() -> StreamConfig {
    StreamConfig {
        reconnect: ReconnectPolicy {
            enabled: true,
            max_retries: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        ..quiet_config()
    }
}

pub fn client<A: ProtocolAdapter>(
    adapter: A,
    rest: Arc<MockRest>,
    transport: &MockTransport,
    config: StreamConfig,
) -> StreamClient<A> {
    StreamClient::with_transport(
        adapter,
        rest,
        Arc::new(transport.clone()),
        config,
        SessionKeyConfig::default(),
    )
}

/// Next text frame the client sent, skipping pings
pub async fn next_text(peer: &MockPeer) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), peer.next_sent())
            .await
            .expect("client sent nothing")
            .expect("peer closed");
        if let Frame::Text(text) = frame {
            return text;
        }
    }
}

/// Next control message as JSON
pub async fn next_control(peer: &MockPeer) -> Value {
    serde_json::from_str(&next_text(peer).await).unwrap()
}

/// `(method, params)` of every control message in `texts`
pub fn controls(texts: &[String]) -> Vec<(String, Vec<String>)> {
    texts
        .iter()
        .map(|text| {
            let value: Value = serde_json::from_str(text).unwrap();
            let params = value["params"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| p.as_str().unwrap().to_string())
                .collect();
            (value["method"].as_str().unwrap().to_string(), params)
        })
        .collect()
}

/// Let spawned tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
