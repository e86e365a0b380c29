/*
[INPUT]:  REST configuration, API credentials, exchange endpoints
[OUTPUT]: Instrument metadata and authenticated responses for the stream engine
[POS]:    REST layer - the collaborator the streaming client consumes from
[UPDATE]: When the engine needs a new REST capability
*/

pub mod client;
pub mod exchange_info;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;

use crate::error::Result;
use crate::types::InstrumentMetadata;

pub use client::{Credentials, RestClient, RestConfig};

/// Parsed exchange info together with the raw response body
#[derive(Debug, Clone, Default)]
pub struct ExchangeInfo {
    pub instruments: HashMap<String, Arc<InstrumentMetadata>>,
    pub raw: Vec<u8>,
}

/// REST capabilities the streaming engine depends on.
///
/// Injected at construction so tests and alternative HTTP stacks can stand in.
#[async_trait]
pub trait RestCollaborator: Send + Sync + std::fmt::Debug {
    /// Fetch every tradable instrument, keyed by upper-case symbol.
    async fn exchange_info(&self) -> Result<ExchangeInfo>;

    /// Perform an API-key authenticated call and return the body.
    async fn authenticated_request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>>;

    /// Whether credentials for private calls are configured.
    fn has_credentials(&self) -> bool;
}
