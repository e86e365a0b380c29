/*
[INPUT]:  Mock HTTP server standing in for the exchange REST API
[OUTPUT]: Test results for the REST collaborator feeding the streaming client
[POS]:    Integration tests - REST collaborator
[UPDATE]: When REST endpoints or the connect-time metadata load change
*/

mod common;

use std::sync::Arc;

use common::{EXCHANGE_INFO, next_control, quiet_config};
use marketstream::{
    BinanceFutures, Credentials, Market, MockTransport, RestClient, RestCollaborator, RestConfig,
    SessionKeyConfig, StreamClient, StreamError,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_exchange_info(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(EXCHANGE_INFO, "application/json"))
        .mount(server)
        .await;
}

fn rest_for(server: &MockServer, market: Market) -> RestClient {
    RestClient::with_config_and_base_url(market, RestConfig::default(), &server.uri())
        .expect("client init")
}

#[tokio::test]
async fn test_spot_exchange_info_falls_back_to_asset_precision() {
    let server = MockServer::start().await;
    mount_exchange_info(&server, "/api/v3/exchangeInfo").await;

    let info = rest_for(&server, Market::Spot).exchange_info().await.unwrap();
    let bnb = &info.instruments["BNBBTC"];
    assert_eq!(bnb.price_precision, 8);
    assert_eq!(bnb.qty_precision, 8);
    assert!(bnb.contract_type.is_none());
    assert_eq!(info.instruments.len(), 3);
}

#[tokio::test]
async fn test_exchange_info_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/exchangeInfo"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = rest_for(&server, Market::Futures)
        .exchange_info()
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::Api { code: 503, .. }));
}

#[tokio::test]
async fn test_client_connects_with_http_metadata_and_mints_listen_key() {
    let server = MockServer::start().await;
    mount_exchange_info(&server, "/fapi/v1/exchangeInfo").await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/listenKey"))
        .and(header("X-MBX-APIKEY", "key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"listenKey":"pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1"}"#, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let rest = rest_for(&server, Market::Futures).with_credentials(Credentials::new("key", "secret"));
    let transport = MockTransport::new();
    let ws = StreamClient::with_transport(
        BinanceFutures::new(),
        Arc::new(rest),
        Arc::new(transport.clone()),
        quiet_config(),
        SessionKeyConfig::default(),
    );

    ws.connect().await.unwrap();
    assert!(ws.instruments().contains("ETHUSDT"));
    let peer = transport.next_peer().await;

    ws.subscribe_orders(|_| {}).await.unwrap();
    let message = next_control(&peer).await;
    assert_eq!(
        message["params"][0],
        "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1"
    );
}

#[tokio::test]
async fn test_listen_key_mint_failure_is_reported() {
    let server = MockServer::start().await;
    mount_exchange_info(&server, "/fapi/v1/exchangeInfo").await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/listenKey"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_raw(r#"{"code":-2015,"msg":"Invalid API-key"}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let rest = rest_for(&server, Market::Futures).with_credentials(Credentials::new("key", "secret"));
    let transport = MockTransport::new();
    let ws = StreamClient::with_transport(
        BinanceFutures::new(),
        Arc::new(rest),
        Arc::new(transport.clone()),
        quiet_config(),
        SessionKeyConfig::default(),
    );
    ws.connect().await.unwrap();

    let err = ws.subscribe_account(|_| {}).await.unwrap_err();
    assert!(matches!(err, StreamError::SessionKey(_)));
    assert_eq!(ws.registry_len(), 0);
}
