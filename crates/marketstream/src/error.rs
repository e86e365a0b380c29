/*
[INPUT]:  Error sources (transport, decode, session key, REST collaborator)
[OUTPUT]: Structured error types with precondition and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::types::{Market, StreamKind};

/// Main error type for the streaming client
#[derive(Error, Debug)]
pub enum StreamError {
    /// `connect` called while a connection is live or being established
    #[error("WebSocket already connected")]
    AlreadyConnected,

    /// Operation requires a live connection
    #[error("WebSocket not connected")]
    NotConnected,

    /// Event referenced a symbol missing from the instrument cache
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Read or write failure on the socket
    #[error("Transport error: {0}")]
    Transport(String),

    /// Private channel requested without API credentials
    #[error("API key and secret are required for private streams")]
    AuthRequired,

    /// Session key could not be minted or renewed
    #[error("Session key error: {0}")]
    SessionKey(String),

    /// Stream kind is not offered by the market adapter
    #[error("{kind} stream is not supported on {market}")]
    Unsupported { market: Market, kind: StreamKind },

    /// Operation did not complete in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Exchange returned an error response or error frame
    #[error("API error (code {code}): {message}")]
    Api { code: i64, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl StreamError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Transport(_)
                | StreamError::Timeout { .. }
                | StreamError::Http(_)
                | StreamError::SessionKey(_)
        )
    }

    /// Errors a subscribe/unsubscribe call reports synchronously because a
    /// precondition was not met.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            StreamError::NotConnected
                | StreamError::AlreadyConnected
                | StreamError::AuthRequired
                | StreamError::SessionKey(_)
                | StreamError::Unsupported { .. }
        )
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        StreamError::Api {
            code: i64::from(status.as_u16()),
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

/// Result type alias for streaming client operations
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let err = StreamError::Timeout {
            operation: "read",
            after: Duration::from_secs(60),
        };
        assert!(err.is_retryable());
        assert!(StreamError::Transport("reset".to_string()).is_retryable());
        assert!(!StreamError::AuthRequired.is_retryable());
        assert!(!StreamError::Decode("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_error_is_precondition() {
        assert!(StreamError::NotConnected.is_precondition());
        assert!(StreamError::AuthRequired.is_precondition());
        assert!(
            StreamError::Unsupported {
                market: Market::Spot,
                kind: StreamKind::FundingRate,
            }
            .is_precondition()
        );
        assert!(!StreamError::UnknownSymbol("BTCUSDT".to_string()).is_precondition());
    }

    #[test]
    fn test_api_error_creation() {
        let err = StreamError::api_error(StatusCode::UNAUTHORIZED, "Invalid API-key");
        match err {
            StreamError::Api { code, message } => {
                assert_eq!(code, 401);
                assert_eq!(message, "Invalid API-key");
            }
            _ => panic!("Expected Api error variant"),
        }
    }

    #[test]
    fn test_unsupported_display() {
        let err = StreamError::Unsupported {
            market: Market::Spot,
            kind: StreamKind::Position,
        };
        assert_eq!(err.to_string(), "position stream is not supported on spot");
    }
}
