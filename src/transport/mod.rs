//! Transport abstraction for issuing requests to the upstream API

pub mod http;
pub mod rate_limit;

pub use http::HttpTransport;
pub use rate_limit::RateLimitGuard;

use crate::error::TransportError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// A fully specified upstream request
///
/// Every documented parameter is carried explicitly, defaults included, so
/// two equal requests always hit the same upstream resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiRequest {
    /// Path relative to the API base URL, e.g. `/coins/markets`
    pub endpoint: String,
    /// Query parameters in insertion order
    pub params: Vec<(&'static str, String)>,
}

impl ApiRequest {
    /// Creates a request for `endpoint` with no parameters
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
        }
    }

    /// Appends a query parameter
    pub fn param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.params.push((key, value.to_string()));
        self
    }

    /// Value of the first parameter named `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Renders `k=v&k=v` with values percent-encoded
    pub fn query_string(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.endpoint)
        } else {
            write!(f, "{}?{}", self.endpoint, self.query_string())
        }
    }
}

/// A successful (2xx) upstream response with a well-formed JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body
    pub body: serde_json::Value,
    /// Time spent on the attempt that produced this response
    pub elapsed: Duration,
}

impl RawResponse {
    /// Creates a 200 response with no recorded latency
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            body,
            elapsed: Duration::ZERO,
        }
    }

    /// Sets the latency of the attempt
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Decodes the body into the expected shape
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        serde_json::from_value(self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Issues requests to the upstream API and classifies the outcome
///
/// Implementations return `Http` for any non-2xx status (including 429),
/// `Network` for connectivity failures and `Decode` for bodies that are not
/// JSON.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;

    /// Returns the name of this transport
    fn transport_name(&self) -> &'static str;
}
