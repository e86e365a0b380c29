/*
[INPUT]:  HTTP configuration (base URL, timeouts, credentials)
[OUTPUT]: Configured reqwest client implementing RestCollaborator
[POS]:    REST layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use tracing::{debug, error};

use crate::error::{Result, StreamError};
use crate::rest::exchange_info::parse_exchange_info;
use crate::rest::{ExchangeInfo, RestCollaborator};
use crate::types::Market;

const SPOT_BASE_URL: &str = "https://api.binance.com";
const FUTURES_BASE_URL: &str = "https://fapi.binance.com";
const SPOT_EXCHANGE_INFO_PATH: &str = "/api/v3/exchangeInfo";
const FUTURES_EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// API credentials for private calls
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

/// reqwest-backed REST collaborator for one market
#[derive(Debug)]
pub struct RestClient {
    http_client: Client,
    market: Market,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl RestClient {
    /// Create a client for `market` with default configuration
    pub fn new(market: Market) -> Result<Self> {
        Self::with_config(market, RestConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(market: Market, config: RestConfig) -> Result<Self> {
        let base_url = match market {
            Market::Spot => SPOT_BASE_URL,
            Market::Futures => FUTURES_BASE_URL,
        };
        Self::with_config_and_base_url(market, config, base_url)
    }

    /// Create a client against an explicit base URL (mock servers, testnets)
    pub fn with_config_and_base_url(
        market: Market,
        config: RestConfig,
        base_url: &str,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            market,
            base_url: Url::parse(base_url)?,
            credentials: None,
        })
    }

    /// Attach credentials for authenticated requests
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set credentials for authenticated requests
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Get credentials if set
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn market(&self) -> Market {
        self.market
    }

    fn exchange_info_path(&self) -> &'static str {
        match self.market {
            Market::Spot => SPOT_EXCHANGE_INFO_PATH,
            Market::Futures => FUTURES_EXCHANGE_INFO_PATH,
        }
    }

    /// Build request builder for an endpoint relative to the base URL
    fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    async fn send_bytes(&self, builder: RequestBuilder) -> Result<Vec<u8>> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if status.is_success() {
            return Ok(body);
        }

        match serde_json::from_slice::<ApiErrorBody>(&body) {
            Ok(api) => Err(StreamError::Api {
                code: api.code,
                message: api.msg,
            }),
            Err(_) => Err(StreamError::api_error(
                status,
                String::from_utf8_lossy(&body).into_owned(),
            )),
        }
    }
}

#[async_trait]
impl RestCollaborator for RestClient {
    /// GET /api/v3/exchangeInfo (spot) or /fapi/v1/exchangeInfo (futures)
    async fn exchange_info(&self) -> Result<ExchangeInfo> {
        let builder = self.request(Method::GET, self.exchange_info_path())?;
        let raw = self.send_bytes(builder).await.inspect_err(|err| {
            error!(market = %self.market, error = %err, "exchange info request failed");
        })?;
        let instruments = parse_exchange_info(&raw)?;
        debug!(market = %self.market, count = instruments.len(), "exchange info loaded");
        Ok(ExchangeInfo { instruments, raw })
    }

    async fn authenticated_request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>> {
        let credentials = self
            .credentials
            .as_ref()
            .filter(|credentials| credentials.is_complete())
            .ok_or(StreamError::AuthRequired)?;

        let mut builder = self
            .request(method, endpoint)?
            .header(API_KEY_HEADER, &credentials.api_key);
        if !params.is_empty() {
            builder = builder.query(params);
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        self.send_bytes(builder).await
    }

    fn has_credentials(&self) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|credentials| credentials.is_complete())
    }
}
