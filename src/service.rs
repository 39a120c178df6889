//! Cached market data service
//!
//! The query interface the presentation layer talks to. Each operation is
//! served from a [`QueryCache`] keyed by operation name and parameters and
//! falls through to the [`MarketDataClient`] on a miss.
//!
//! ```text
//! MarketDataService::top_coins / coin_detail / market_chart / search / coins_by_ids
//!     ↓
//! QueryCache (freshness, coalescing, background refresh)
//!     ↓
//! MarketDataClient (typed operations)
//!     ↓
//! RateLimitGuard (429 cool-down + retry)
//!     ↓
//! HttpTransport (CoinGecko REST)
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use coin_market_sdk::{MarketDataConfig, MarketDataService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = MarketDataService::new(MarketDataConfig::from_env())?;
//!
//! match service.coin_detail("bitcoin").await {
//!     Ok(coin) => println!("{}: {:.2}", coin.summary.name, coin.summary.current_price),
//!     Err(e) if e.is_not_found() => println!("{}", e.user_message()),
//!     Err(e) => eprintln!("{} ({})", e.user_message(), e),
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
    cache::{CacheStats, QueryCache, QueryKey},
    client::MarketDataClient,
    clock::{Clock, TokioClock},
    config::{CacheTtls, MarketDataConfig},
    error::MarketDataError,
    metrics::ProviderMetrics,
    types::{ChartWindow, CoinDetail, CoinSummary, ComponentHealth, HealthStatus, MarketChartSeries},
    watchlist::WatchlistStore,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Cache operation name for the ranked listing
pub const LIST_TOP_COINS: &str = "listTopCoins";
/// Cache operation name for coin detail
pub const GET_COIN_DETAIL: &str = "getCoinDetail";
/// Cache operation name for chart series
pub const GET_MARKET_CHART: &str = "getMarketChart";
/// Cache operation name for search results
pub const SEARCH_COINS: &str = "searchCoins";
/// Cache operation name for batched lookups by id
pub const GET_COINS_BY_IDS: &str = "getCoinsByIds";

/// Success rate below which the service reports itself degraded
const DEGRADED_SUCCESS_RATE: f64 = 0.9;

/// Cached entry point for market data
///
/// Construct one per application and share it (`Arc<MarketDataService>`).
pub struct MarketDataService {
    client: Arc<MarketDataClient>,
    coins: QueryCache<Arc<Vec<CoinSummary>>>,
    details: QueryCache<Arc<CoinDetail>>,
    charts: QueryCache<Arc<MarketChartSeries>>,
    ttls: CacheTtls,
}

impl MarketDataService {
    /// Creates a service talking HTTP to the configured API
    pub fn new(config: MarketDataConfig) -> Result<Self, MarketDataError> {
        let client = MarketDataClient::new(&config)?;
        tracing::info!(
            base_url = %config.base_url,
            currency = %config.default_currency,
            max_retries = ?config.rate_limit.max_retries,
            "Market data service ready"
        );
        Ok(Self::with_client(client, config.ttls))
    }

    /// Creates a service over an existing client
    pub fn with_client(client: MarketDataClient, ttls: CacheTtls) -> Self {
        Self::with_client_and_clock(client, ttls, Arc::new(TokioClock))
    }

    /// Creates a service whose caches age entries on `clock`
    pub fn with_client_and_clock(
        client: MarketDataClient,
        ttls: CacheTtls,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            coins: QueryCache::new(clock.clone()),
            details: QueryCache::new(clock.clone()),
            charts: QueryCache::new(clock),
            ttls,
        }
    }

    /// Underlying uncached client
    pub fn client(&self) -> &MarketDataClient {
        &self.client
    }

    /// Cache key for a page of the ranked listing
    pub fn top_coins_key(page: u32, page_size: u32, currency: &str) -> QueryKey {
        QueryKey::new(
            LIST_TOP_COINS,
            format!(
                "page={},size={},currency={}",
                page,
                page_size,
                normalize(currency)
            ),
        )
    }

    /// Page `page` of the ranked listing
    pub async fn top_coins(
        &self,
        page: u32,
        page_size: u32,
        currency: &str,
    ) -> Result<Arc<Vec<CoinSummary>>, MarketDataError> {
        let key = Self::top_coins_key(page, page_size, currency);
        let client = self.client.clone();
        let currency = normalize(currency);

        self.coins
            .get(&key, self.ttls.top_coins, move || async move {
                client
                    .list_top_coins(page, page_size, &currency)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    /// Detail for one coin
    pub async fn coin_detail(&self, id: &str) -> Result<Arc<CoinDetail>, MarketDataError> {
        let id = id.trim().to_string();
        let key = QueryKey::new(GET_COIN_DETAIL, format!("id={}", id));
        let client = self.client.clone();

        self.details
            .get(&key, self.ttls.coin_detail, move || async move {
                client.get_coin_detail(&id).await.map(Arc::new)
            })
            .await
    }

    /// Chart series for one coin; each window is cached separately
    pub async fn market_chart(
        &self,
        id: &str,
        window: ChartWindow,
        currency: &str,
    ) -> Result<Arc<MarketChartSeries>, MarketDataError> {
        let id = id.trim().to_string();
        let currency = normalize(currency);
        let key = QueryKey::new(
            GET_MARKET_CHART,
            format!("id={},days={},currency={}", id, window.days_param(), currency),
        );
        let client = self.client.clone();

        self.charts
            .get(&key, self.ttls.market_chart, move || async move {
                client
                    .get_market_chart(&id, window, &currency)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    /// Search results, hydrated into market rows
    ///
    /// Blank queries return an empty list without caching anything.
    pub async fn search(&self, query: &str) -> Result<Arc<Vec<CoinSummary>>, MarketDataError> {
        let query = normalize(query);
        if query.is_empty() {
            return Ok(Arc::new(Vec::new()));
        }

        let key = QueryKey::new(SEARCH_COINS, format!("query={}", query));
        let client = self.client.clone();

        self.coins
            .get(&key, self.ttls.search, move || async move {
                client.search_coins(&query).await.map(Arc::new)
            })
            .await
    }

    /// Market rows for a set of ids
    ///
    /// The key is built from the sorted, de-duplicated ids, so the same set
    /// in any order shares one entry. An empty set never reaches the cache.
    pub async fn coins_by_ids<I, S>(&self, ids: I) -> Result<Arc<Vec<CoinSummary>>, MarketDataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: BTreeSet<String> = ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        if ids.is_empty() {
            return Ok(Arc::new(Vec::new()));
        }

        let key = QueryKey::new(
            GET_COINS_BY_IDS,
            format!(
                "ids={},currency={}",
                ids.iter().cloned().collect::<Vec<_>>().join(","),
                self.client.default_currency()
            ),
        );
        let client = self.client.clone();

        self.coins
            .get(&key, self.ttls.watchlist, move || async move {
                client.get_coins_by_ids(&ids).await.map(Arc::new)
            })
            .await
    }

    /// Market rows for everything on the watchlist
    pub async fn watchlist_coins(
        &self,
        watchlist: &WatchlistStore,
    ) -> Result<Arc<Vec<CoinSummary>>, MarketDataError> {
        self.coins_by_ids(watchlist.all()).await
    }

    /// Forces every listing page to be fetched again
    pub fn invalidate_top_coins(&self) -> usize {
        self.coins.invalidate_operation(LIST_TOP_COINS)
    }

    /// Forces detail and every chart window of `id` to be fetched again
    pub fn invalidate_coin(&self, id: &str) -> usize {
        let id = id.trim();
        let detail = self
            .details
            .invalidate(&QueryKey::new(GET_COIN_DETAIL, format!("id={}", id)));
        let prefix = format!("id={},", id);
        let charts = self
            .charts
            .invalidate_where(|key| key.params().starts_with(&prefix));
        usize::from(detail) + charts
    }

    /// Forces every watchlist batch to be fetched again
    pub fn invalidate_watchlist(&self) -> usize {
        self.coins.invalidate_operation(GET_COINS_BY_IDS)
    }

    /// Drops every cached query
    pub fn clear_cache(&self) {
        self.coins.clear();
        self.details.clear();
        self.charts.clear();
    }

    /// Combined counters of every cache
    pub fn cache_stats(&self) -> CacheStats {
        self.coins.stats() + self.details.stats() + self.charts.stats()
    }

    /// Cached listing page, regardless of age, without fetching
    pub fn peek_top_coins(
        &self,
        page: u32,
        page_size: u32,
        currency: &str,
    ) -> Option<Arc<Vec<CoinSummary>>> {
        self.coins.peek(&Self::top_coins_key(page, page_size, currency))
    }

    /// Upstream request metrics including latency percentiles and throttles
    pub async fn provider_metrics(&self) -> ProviderMetrics {
        self.client.metrics().await
    }

    /// Perform a health check on the service
    ///
    /// # Returns
    /// ComponentHealth indicating the status of the upstream API as seen
    /// through recent requests
    pub async fn health_check(&self) -> ComponentHealth {
        let metrics = self.provider_metrics().await;
        let mut details = HashMap::new();

        details.insert(
            "provider_name".to_string(),
            serde_json::json!(metrics.provider_name),
        );
        details.insert(
            "cached_queries".to_string(),
            serde_json::json!(self.coins.len() + self.details.len() + self.charts.len()),
        );
        details.insert(
            "total_requests".to_string(),
            serde_json::json!(metrics.total_requests),
        );
        details.insert(
            "success_rate".to_string(),
            serde_json::json!(metrics.success_rate),
        );
        details.insert(
            "throttled_requests".to_string(),
            serde_json::json!(metrics.throttled_requests),
        );
        details.insert(
            "latency_p50_ms".to_string(),
            serde_json::json!(metrics.latency_p50_ms),
        );

        let status = if metrics.total_requests > 0 && metrics.success_rate == 0.0 {
            HealthStatus::Unhealthy
        } else if metrics.recently_throttled || metrics.success_rate < DEGRADED_SUCCESS_RATE {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let message = match status {
            HealthStatus::Healthy => "Market data service is operational".to_string(),
            HealthStatus::Degraded => format!(
                "Market data service is degraded (success rate {:.0}%, {} throttled)",
                metrics.success_rate * 100.0,
                metrics.throttled_requests
            ),
            HealthStatus::Unhealthy => "Recent upstream requests have all failed".to_string(),
        };

        ComponentHealth {
            name: "market_data_service".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: chrono::Utc::now(),
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
