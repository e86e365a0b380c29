/*
[INPUT]:  Streaming client lifecycle and subscription scenarios
[OUTPUT]: Test results for connect/close, subscribe/unsubscribe and reconnection
[POS]:    Integration tests - streaming client
[UPDATE]: When client lifecycle or subscription semantics change
*/

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{
    MockRest, client, controls, next_control, next_text, quiet_config, reconnecting_config,
    settle, wait_until,
};
use marketstream::{
    BinanceFutures, BinanceSpot, ConnectionState, KlinePeriod, MockTransport, StreamError,
    StreamKind,
};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_connect_twice_returns_already_connected() {
    let transport = MockTransport::new();
    let ws = client(BinanceFutures::new(), MockRest::public(), &transport, quiet_config());

    assert_ok!(ws.connect().await);
    assert_eq!(ws.state(), ConnectionState::Connected);
    assert!(matches!(ws.connect().await, Err(StreamError::AlreadyConnected)));
    assert_eq!(transport.connect_attempts(), 1);
    assert_eq!(transport.urls(), vec!["wss://fstream.binance.com/stream".to_string()]);
}

#[tokio::test]
async fn test_close_when_disconnected_returns_not_connected() {
    let transport = MockTransport::new();
    let ws = client(BinanceFutures::new(), MockRest::public(), &transport, quiet_config());

    assert!(matches!(ws.close().await, Err(StreamError::NotConnected)));

    assert_ok!(ws.connect().await);
    assert_ok!(ws.close().await);
    assert_eq!(ws.state(), ConnectionState::Disconnected);
    assert!(matches!(ws.close().await, Err(StreamError::NotConnected)));
}

#[tokio::test]
async fn test_connect_loads_instruments_before_connected() {
    let transport = MockTransport::new();
    let rest = MockRest::public();
    let ws = client(BinanceFutures::new(), rest.clone(), &transport, quiet_config());

    let observed = Arc::new(AtomicUsize::new(0));
    let captured = observed.clone();
    let instruments = ws.clone();
    ws.set_connected_handler(move || {
        captured.store(instruments.instruments().len(), Ordering::SeqCst);
    });

    ws.connect().await.unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 3);
    assert_eq!(rest.exchange_info_calls(), 1);
    assert_eq!(ws.instruments().resolve("btcusdt").unwrap().base_asset, "BTC");
}

#[tokio::test]
async fn test_connect_fails_when_instruments_unavailable() {
    let transport = MockTransport::new();
    let rest = MockRest::public();
    rest.fail_exchange_info(true);
    let ws = client(BinanceFutures::new(), rest.clone(), &transport, quiet_config());

    assert_err!(ws.connect().await);
    assert_eq!(ws.state(), ConnectionState::Disconnected);
    assert_eq!(transport.connect_attempts(), 0);

    rest.fail_exchange_info(false);
    assert_ok!(ws.connect().await);
    assert!(ws.is_connected());
}

#[tokio::test]
async fn test_subscribe_preconditions() {
    let transport = MockTransport::new();
    let spot = client(BinanceSpot::new(), MockRest::public(), &transport, quiet_config());

    assert!(matches!(
        spot.subscribe_ticker("BNBBTC", |_| {}).await,
        Err(StreamError::NotConnected)
    ));
    assert!(matches!(
        spot.subscribe_funding_rate("BNBBTC", |_| {}).await,
        Err(StreamError::Unsupported {
            kind: StreamKind::FundingRate,
            ..
        })
    ));
    assert!(matches!(
        spot.subscribe_positions(|_| {}).await,
        Err(StreamError::Unsupported { .. })
    ));

    spot.connect().await.unwrap();
    assert!(matches!(
        spot.subscribe_orders(|_| {}).await,
        Err(StreamError::AuthRequired)
    ));
    assert_eq!(spot.registry_len(), 0);
}

#[tokio::test]
async fn test_subscribe_sends_control_message() {
    let transport = MockTransport::new();
    let ws = client(BinanceFutures::new(), MockRest::public(), &transport, quiet_config());
    ws.connect().await.unwrap();
    let peer = transport.next_peer().await;

    ws.subscribe_ticker("BTCUSDT", |_| {}).await.unwrap();
    let message = next_control(&peer).await;
    assert_eq!(message["method"], "SUBSCRIBE");
    assert_eq!(message["params"][0], "btcusdt@ticker");
    assert_eq!(message["id"].as_str().unwrap().len(), 32);

    ws.subscribe_depth("BTCUSDT", 20, None, |_| {}).await.unwrap();
    assert_eq!(next_control(&peer).await["params"][0], "btcusdt@depth20@100ms");

    ws.unsubscribe_ticker("BTCUSDT").await.unwrap();
    let message = next_control(&peer).await;
    assert_eq!(message["method"], "UNSUBSCRIBE");
    assert_eq!(message["params"][0], "btcusdt@ticker");
    assert_eq!(ws.registry_len(), 1);
}

#[tokio::test]
async fn test_spot_trade_uses_raw_trade_stream() {
    let transport = MockTransport::new();
    let ws = client(BinanceSpot::new(), MockRest::public(), &transport, quiet_config());
    ws.connect().await.unwrap();
    let peer = transport.next_peer().await;

    ws.subscribe_trade("BNBBTC", |_| {}).await.unwrap();
    assert_eq!(next_control(&peer).await["params"][0], "bnbbtc@trade");
}

#[tokio::test]
async fn test_reconnect_restores_every_subscription() {
    let transport = MockTransport::new();
    let rest = MockRest::public();
    let ws = client(BinanceFutures::new(), rest.clone(), &transport, reconnecting_config());
    ws.connect().await.unwrap();
    let first = transport.next_peer().await;

    ws.subscribe_ticker("BTCUSDT", |_| {}).await.unwrap();
    ws.subscribe_depth("ETHUSDT", 5, Some("250ms"), |_| {}).await.unwrap();
    ws.subscribe_kline("BTCUSDT", KlinePeriod::Hour1, |_| {}).await.unwrap();
    ws.subscribe_funding_rate("ETHUSDT", |_| {}).await.unwrap();
    let before: HashSet<String> = controls(&first.drain_sent_text())
        .into_iter()
        .flat_map(|(_, params)| params)
        .collect();
    assert_eq!(before.len(), 4);

    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    ws.set_disconnected_handler(move |cause| {
        assert!(cause.is_some());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    first.drop_connection();
    let second = tokio::time::timeout(Duration::from_secs(2), transport.next_peer())
        .await
        .expect("client did not reconnect");

    let mut after = HashSet::new();
    for _ in 0..before.len() {
        let message: serde_json::Value = serde_json::from_str(&next_text(&second).await).unwrap();
        assert_eq!(message["method"], "SUBSCRIBE");
        after.insert(message["params"][0].as_str().unwrap().to_string());
    }
    assert_eq!(after, before);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert!(ws.is_connected());
    // Reconnects reuse the instrument cache.
    assert_eq!(rest.exchange_info_calls(), 1);
}

#[tokio::test]
async fn test_reconnect_retries_failed_handshakes() {
    let transport = MockTransport::new();
    let ws = client(BinanceFutures::new(), MockRest::public(), &transport, reconnecting_config());
    ws.connect().await.unwrap();
    let first = transport.next_peer().await;

    transport.fail_connects(2);
    first.fail_read("connection reset");
    tokio::time::timeout(Duration::from_secs(2), transport.next_peer())
        .await
        .expect("client did not reconnect");

    assert_eq!(transport.connect_attempts(), 4);
    wait_until(|| ws.is_connected()).await;
}

#[tokio::test]
async fn test_close_stops_reconnection() {
    let transport = MockTransport::new();
    let ws = client(BinanceFutures::new(), MockRest::public(), &transport, reconnecting_config());
    ws.connect().await.unwrap();
    let first = transport.next_peer().await;

    transport.fail_connects(100);
    first.drop_connection();
    wait_until(|| transport.connect_attempts() >= 2).await;
    let _ = ws.close().await;

    let attempts = transport.connect_attempts();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.connect_attempts(), attempts);
    assert_eq!(ws.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_explicit_reconnect_after_close_resubscribes() {
    let transport = MockTransport::new();
    let rest = MockRest::public();
    let ws = client(BinanceFutures::new(), rest.clone(), &transport, quiet_config());
    ws.connect().await.unwrap();
    let first = transport.next_peer().await;
    ws.subscribe_trade("BTCUSDT", |_| {}).await.unwrap();
    assert_eq!(next_control(&first).await["params"][0], "btcusdt@aggTrade");

    ws.close().await.unwrap();
    ws.connect().await.unwrap();
    let second = transport.next_peer().await;
    assert_eq!(next_control(&second).await["params"][0], "btcusdt@aggTrade");
    assert_eq!(rest.exchange_info_calls(), 2);
}

#[tokio::test]
async fn test_last_private_unsubscribe_sends_one_unsubscribe() {
    let transport = MockTransport::new();
    let rest = MockRest::with_credentials();
    let ws = client(BinanceFutures::new(), rest.clone(), &transport, quiet_config());
    ws.connect().await.unwrap();
    let peer = transport.next_peer().await;

    ws.subscribe_orders(|_| {}).await.unwrap();
    ws.subscribe_account(|_| {}).await.unwrap();
    ws.subscribe_positions(|_| {}).await.unwrap();
    let subscribed = controls(&peer.drain_sent_text());
    assert!(subscribed
        .iter()
        .all(|(method, params)| method == "SUBSCRIBE" && params == &vec!["listen-key-1".to_string()]));
    assert_eq!(rest.count(reqwest::Method::POST), 1);

    ws.unsubscribe_orders().await.unwrap();
    ws.unsubscribe_positions().await.unwrap();
    assert!(peer.drain_sent_text().is_empty());

    ws.unsubscribe_account().await.unwrap();
    let sent = controls(&peer.drain_sent_text());
    assert_eq!(
        sent,
        vec![("UNSUBSCRIBE".to_string(), vec!["listen-key-1".to_string()])]
    );
    assert_eq!(ws.registry_len(), 0);
}

#[tokio::test]
async fn test_exchange_error_frame_reaches_error_handler() {
    let transport = MockTransport::new();
    let ws = client(BinanceFutures::new(), MockRest::public(), &transport, quiet_config());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let captured = errors.clone();
    ws.set_error_handler(move |err| captured.lock().unwrap().push(err.to_string()));

    ws.connect().await.unwrap();
    let peer = transport.next_peer().await;
    peer.push_text(r#"{"code": 2, "msg": "Invalid request: unknown variant", "id": "abc"}"#);
    wait_until(|| !errors.lock().unwrap().is_empty()).await;

    let errors = errors.lock().unwrap();
    assert!(errors[0].contains("code 2"));
    assert!(ws.is_connected());
}

#[tokio::test]
async fn test_dropped_client_stops_connection_tasks() {
    let transport = MockTransport::new();
    let ws = client(BinanceFutures::new(), MockRest::public(), &transport, reconnecting_config());
    ws.connect().await.unwrap();
    let peer = transport.next_peer().await;

    drop(ws);
    settle().await;
    peer.drop_connection();
    settle().await;
    assert_eq!(transport.connect_attempts(), 1);
}
