//! Runtime configuration for the client
//!
//! Defaults come from [`crate::constants`]. A handful of values can be
//! overridden through environment variables via [`MarketDataConfig::from_env`].

use crate::constants::{
    COINGECKO_API_URL, COIN_DETAIL_TTL_SECS, DEFAULT_CURRENCY, ENV_API_URL, ENV_CURRENCY,
    ENV_MAX_RETRIES, MARKET_CHART_TTL_SECS, RATE_LIMIT_COOLDOWN_SECS, REQUEST_TIMEOUT_SECS,
    SEARCH_TTL_SECS, TOP_COINS_TTL_SECS, WATCHLIST_TTL_SECS,
};
use std::time::Duration;

/// How the rate-limit guard reacts to HTTP 429
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Fixed wait before re-issuing a throttled request
    pub cooldown: Duration,
    /// Retries allowed after the first throttle; `None` retries forever
    pub max_retries: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(RATE_LIMIT_COOLDOWN_SECS),
            max_retries: None,
        }
    }
}

/// Freshness windows per query family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    pub top_coins: Duration,
    pub coin_detail: Duration,
    pub market_chart: Duration,
    pub search: Duration,
    pub watchlist: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            top_coins: Duration::from_secs(TOP_COINS_TTL_SECS),
            coin_detail: Duration::from_secs(COIN_DETAIL_TTL_SECS),
            market_chart: Duration::from_secs(MARKET_CHART_TTL_SECS),
            search: Duration::from_secs(SEARCH_TTL_SECS),
            watchlist: Duration::from_secs(WATCHLIST_TTL_SECS),
        }
    }
}

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDataConfig {
    /// Upstream base URL, without trailing slash
    pub base_url: String,
    /// Quote currency for operations that do not take one explicitly
    pub default_currency: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub ttls: CacheTtls,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: COINGECKO_API_URL.to_string(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            rate_limit: RateLimitConfig::default(),
            ttls: CacheTtls::default(),
        }
    }
}

impl MarketDataConfig {
    /// Defaults overlaid with `MARKET_DATA_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(currency) = lookup(ENV_CURRENCY).filter(|v| !v.trim().is_empty()) {
            config.default_currency = currency.trim().to_lowercase();
        }

        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            match raw.trim().parse::<u32>() {
                Ok(n) => config.rate_limit.max_retries = Some(n),
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring unparsable {}, retries stay unbounded",
                    ENV_MAX_RETRIES
                ),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_constants() {
        let config = MarketDataConfig::default();
        assert_eq!(config.base_url, COINGECKO_API_URL);
        assert_eq!(config.default_currency, "usd");
        assert_eq!(config.rate_limit.cooldown, Duration::from_secs(60));
        assert_eq!(config.rate_limit.max_retries, None);
        assert_eq!(config.ttls.top_coins, Duration::from_secs(300));
        assert_eq!(config.ttls.coin_detail, Duration::from_secs(120));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "http://localhost:9000/api/"),
            (ENV_CURRENCY, " EUR "),
            (ENV_MAX_RETRIES, "5"),
        ]);
        let config = MarketDataConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.base_url, "http://localhost:9000/api");
        assert_eq!(config.default_currency, "eur");
        assert_eq!(config.rate_limit.max_retries, Some(5));
    }

    #[test]
    fn test_bad_retry_value_is_ignored() {
        let config = MarketDataConfig::from_lookup(|k| {
            (k == ENV_MAX_RETRIES).then(|| "lots".to_string())
        });
        assert_eq!(config.rate_limit.max_retries, None);
    }
}
