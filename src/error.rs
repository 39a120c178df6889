//! Error types for the coin market client

use thiserror::Error;

/// Errors produced at the transport seam
///
/// `Clone` so a single failure can be handed to every caller sharing an
/// in-flight request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// Connectivity failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Body was not well-formed for the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Gave up after the configured number of throttled attempts
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
}

impl TransportError {
    /// True for an HTTP 429 response
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Http { status: 429, .. })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors surfaced to consumers of market data
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketDataError {
    /// Upstream unreachable
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream rejected the request
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Coin id unknown to upstream
    #[error("Coin not found: {id}")]
    NotFound { id: String },

    /// Malformed upstream payload
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Retry ceiling reached while throttled
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Caller broke an operation's contract; nothing was sent upstream
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketDataError {
    /// Creates a NotFound error
    pub fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Creates an InvalidArgument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an Internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the coin does not exist upstream
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Message a presentation layer shows for this failure
    ///
    /// Only "not found" gets its own wording; everything else is the same
    /// retry-later affordance.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "No such coin.",
            _ => "Data unavailable, please try again later.",
        }
    }
}

impl From<TransportError> for MarketDataError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => Self::Network(msg),
            TransportError::Http { status, body } => Self::Http { status, body },
            TransportError::Decode(msg) => Self::Decode(msg),
            TransportError::RateLimited { attempts } => Self::RateLimited { attempts },
        }
    }
}

/// Errors raised while persisting client-side state
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying read or write failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be serialized
    #[error("Storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
