//! Error types for the dl-dht client.

use thiserror::Error;

/// Top-level error type for the dl-dht client.
#[derive(Error, Debug)]
pub enum DhtError {
    /// The client configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A key does not have the `/<namespace>/<key>` shape.
    #[error("Invalid key: {0}")]
    KeyShape(String),

    /// A network address could not be parsed or is not dialable.
    #[error("Invalid address: {0}")]
    InvalidAddr(String),

    /// A connect, stream-open or write step exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// An underlying I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote peer violated the framing or negotiation protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote node answered with a non-empty `err` field.
    #[error("Remote error: {0}")]
    Remote(String),

    /// The remote node reported that the key does not exist.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A value exceeds the configured maximum size.
    #[error("Value too large: {size} bytes (max {max})")]
    ValueTooLarge {
        /// Size of the rejected value.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// No local node could be discovered.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The fallback loop had nothing to try.
    #[error("RPC failed: no address/protocol attempt was made")]
    NoAttempts,
}

impl DhtError {
    /// Whether this error came from connection setup and is worth trying
    /// against the next address or protocol.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DhtError::Timeout(_) | DhtError::Io(_) | DhtError::Protocol(_)
        )
    }
}

/// Convenience alias used across the dl-dht crates.
pub type DhtResult<T> = Result<T, DhtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DhtError::KeyShape("key must start with \"/\" (got \"ur/test\")".into());
        assert!(err.to_string().contains("ur/test"));

        let err = DhtError::ValueTooLarge { size: 20, max: 10 };
        assert_eq!(err.to_string(), "Value too large: 20 bytes (max 10)");
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(DhtError::Timeout("dial".into()).is_connection_error());
        assert!(DhtError::Io(std::io::Error::other("reset")).is_connection_error());
        assert!(!DhtError::Remote("boom".into()).is_connection_error());
        assert!(!DhtError::KeyShape("x".into()).is_connection_error());
    }
}
