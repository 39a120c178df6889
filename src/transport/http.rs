//! reqwest-backed transport

use crate::{
    config::MarketDataConfig,
    constants::USER_AGENT,
    error::TransportError,
    transport::{ApiRequest, RawResponse, Transport},
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Instant;

/// HTTP transport for the CoinGecko REST API
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a new transport from the client configuration
    pub fn new(config: &MarketDataConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        format!("{}{}", self.base_url, request.endpoint)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let url = self.url_for(request);
        tracing::debug!(url = %url, query = %request.query_string(), "Sending upstream request");

        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .query(&request.params)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let elapsed = started.elapsed();

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = serde_json::from_str(&text).map_err(|e| {
            TransportError::Decode(format!(
                "Failed to parse response from {}: {}. Response: {}",
                request.endpoint, e, text
            ))
        })?;

        Ok(RawResponse {
            status: status.as_u16(),
            body,
            elapsed,
        })
    }

    fn transport_name(&self) -> &'static str {
        "coingecko"
    }
}
