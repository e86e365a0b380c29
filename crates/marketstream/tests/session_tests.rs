/*
[INPUT]:  Private subscription scenarios with a counting REST collaborator
[OUTPUT]: Test results for session key minting, renewal and private resubscription
[POS]:    Integration tests - session keys
[UPDATE]: When session key lifecycle or private channel handling changes
*/

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockRest, next_control, quiet_config, reconnecting_config, wait_until};
use marketstream::{
    BinanceFutures, BinanceSpot, MockTransport, ProtocolAdapter, SessionKeyConfig,
    SessionKeyState, StreamClient, StreamConfig,
};
use reqwest::Method;
use tokio_test::assert_ok;

fn fast_renewal() -> SessionKeyConfig {
    SessionKeyConfig {
        validity: Duration::from_secs(5),
        renewal_interval: Duration::from_millis(40),
    }
}

fn private_client<A: ProtocolAdapter>(
    adapter: A,
    rest: Arc<MockRest>,
    transport: &MockTransport,
    config: StreamConfig,
) -> StreamClient<A> {
    StreamClient::with_transport(adapter, rest, Arc::new(transport.clone()), config, fast_renewal())
}

#[tokio::test]
async fn test_renewal_runs_only_while_private_channels_exist() {
    let transport = MockTransport::new();
    let rest = MockRest::with_credentials();
    let ws = private_client(BinanceFutures::new(), rest.clone(), &transport, quiet_config());
    ws.connect().await.unwrap();

    assert_eq!(ws.session_key_state(), SessionKeyState::NoKey);
    ws.subscribe_orders(|_| {}).await.unwrap();
    assert_eq!(ws.session_key_state(), SessionKeyState::Valid);
    wait_until(|| rest.count(Method::PUT) >= 2).await;

    assert_ok!(ws.unsubscribe_orders().await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    let renewals = rest.count(Method::PUT);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rest.count(Method::PUT), renewals);
    assert_eq!(rest.count(Method::POST), 1);
}

#[tokio::test]
async fn test_futures_renewal_targets_listen_key_endpoint() {
    let transport = MockTransport::new();
    let rest = MockRest::with_credentials();
    let ws = private_client(BinanceFutures::new(), rest.clone(), &transport, quiet_config());
    ws.connect().await.unwrap();
    ws.subscribe_account(|_| {}).await.unwrap();
    wait_until(|| rest.count(Method::PUT) >= 1).await;

    let calls = rest.calls();
    assert!(calls.iter().all(|call| call.endpoint == "/fapi/v1/listenKey"));
    let renewal = calls.iter().find(|call| call.method == Method::PUT).unwrap();
    assert!(renewal.params.is_empty());
}

#[tokio::test]
async fn test_spot_renewal_names_the_key() {
    let transport = MockTransport::new();
    let rest = MockRest::with_credentials();
    let ws = private_client(BinanceSpot::new(), rest.clone(), &transport, quiet_config());
    ws.connect().await.unwrap();
    ws.subscribe_orders(|_| {}).await.unwrap();
    wait_until(|| rest.count(Method::PUT) >= 1).await;

    let renewal = rest
        .calls()
        .into_iter()
        .find(|call| call.method == Method::PUT)
        .unwrap();
    assert_eq!(renewal.endpoint, "/api/v3/userDataStream");
    assert_eq!(
        renewal.params,
        vec![("listenKey".to_string(), "listen-key-1".to_string())]
    );
}

#[tokio::test]
async fn test_close_stops_renewal() {
    let transport = MockTransport::new();
    let rest = MockRest::with_credentials();
    let ws = private_client(BinanceFutures::new(), rest.clone(), &transport, quiet_config());
    ws.connect().await.unwrap();
    ws.subscribe_orders(|_| {}).await.unwrap();
    wait_until(|| rest.count(Method::PUT) >= 1).await;

    assert_ok!(ws.close().await);
    let renewals = rest.count(Method::PUT);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rest.count(Method::PUT), renewals);
    assert_eq!(ws.registry_len(), 1);
}

#[tokio::test]
async fn test_reconnect_resubscribes_private_channel_once() {
    let transport = MockTransport::new();
    let rest = MockRest::with_credentials();
    let ws = private_client(BinanceFutures::new(), rest.clone(), &transport, reconnecting_config());
    ws.connect().await.unwrap();
    let first = transport.next_peer().await;

    ws.subscribe_orders(|_| {}).await.unwrap();
    ws.subscribe_positions(|_| {}).await.unwrap();
    ws.subscribe_ticker("BTCUSDT", |_| {}).await.unwrap();
    first.drain_sent_text();

    first.drop_connection();
    let second = tokio::time::timeout(Duration::from_secs(2), transport.next_peer())
        .await
        .expect("client did not reconnect");

    let mut channels = Vec::new();
    for _ in 0..2 {
        let message = next_control(&second).await;
        channels.push(message["params"][0].as_str().unwrap().to_string());
    }
    channels.sort();
    assert_eq!(channels, vec!["btcusdt@ticker".to_string(), "listen-key-1".to_string()]);
    // The key was still valid, so no new one was minted.
    assert_eq!(rest.count(Method::POST), 1);
}
