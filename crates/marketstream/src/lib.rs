/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public streaming client crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod error;
pub mod protocol;
pub mod rest;
pub mod types;
pub mod ws;

pub use error::{Result, StreamError};

// Re-export commonly used types from auth
pub use auth::{SessionKeyConfig, SessionKeyManager, SessionKeyState};

// Re-export commonly used types from protocol
pub use protocol::{BinanceFutures, BinanceSpot, ProtocolAdapter};

// Re-export commonly used types from rest
pub use rest::{Credentials, ExchangeInfo, RestClient, RestCollaborator, RestConfig};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ConnectionState, InstrumentCache, MockTransport, ReconnectPolicy, StreamClient, StreamConfig,
};

/// Binance USD-M futures client
pub type FuturesStreamClient = StreamClient<BinanceFutures>;

/// Binance spot client
pub type SpotStreamClient = StreamClient<BinanceSpot>;
