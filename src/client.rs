//! Typed operations against the CoinGecko API
//!
//! Every call goes through the [`RateLimitGuard`], so throttling only shows
//! up as latency. Arguments are validated before anything is sent.

use crate::{
    clock::{Clock, TokioClock},
    config::MarketDataConfig,
    constants::{
        COINS_ENDPOINT, MARKETS_ENDPOINT, MAX_PAGE_SIZE, SEARCH_ENDPOINT, SEARCH_HYDRATE_LIMIT,
    },
    error::{MarketDataError, TransportError},
    metrics::{MetricsCollector, ProviderMetrics},
    transport::{ApiRequest, HttpTransport, RateLimitGuard, Transport},
    types::{ChartWindow, CoinDetail, CoinSummary, MarketChartSeries},
    wire::{DetailResponse, MarketChartResponse, MarketRow, SearchResponse},
};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Change windows requested for the ranked listing
const LISTING_CHANGE_WINDOWS: &str = "24h,7d,30d";

/// Change windows requested when hydrating ids (search, watchlist)
const BATCH_CHANGE_WINDOWS: &str = "24h";

/// Client for the upstream market data API
pub struct MarketDataClient {
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricsCollector>,
    default_currency: String,
}

impl MarketDataClient {
    /// Creates a client talking HTTP to the configured base URL
    pub fn new(config: &MarketDataConfig) -> Result<Self, MarketDataError> {
        let http = HttpTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(http), config))
    }

    /// Creates a client over a custom transport
    pub fn with_transport(transport: Arc<dyn Transport>, config: &MarketDataConfig) -> Self {
        Self::with_transport_and_clock(transport, config, Arc::new(TokioClock))
    }

    /// Creates a client over a custom transport, sleeping out throttles on `clock`
    pub fn with_transport_and_clock(
        transport: Arc<dyn Transport>,
        config: &MarketDataConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new(transport.transport_name()));
        let guard = RateLimitGuard::with_clock(transport, config.rate_limit.clone(), clock)
            .with_metrics(metrics.clone());

        Self {
            transport: Arc::new(guard),
            metrics,
            default_currency: config.default_currency.clone(),
        }
    }

    /// Quote currency used by `search_coins`, `get_coins_by_ids` and `get_coin_detail`
    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Returns the name of the upstream transport
    pub fn provider_name(&self) -> &'static str {
        self.transport.transport_name()
    }

    /// Returns latency, success rate and throttle counts for upstream requests
    pub async fn metrics(&self) -> ProviderMetrics {
        self.metrics.get_metrics().await
    }

    /// Sends a request and decodes the body, recording latency and outcome
    ///
    /// Latency is that of the attempt that produced the response, so time
    /// spent sitting out a throttle is not counted.
    async fn fetch<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, TransportError> {
        let started = Instant::now();

        let (result, latency) = match self.transport.send(request).await {
            Ok(response) => {
                let latency = response.elapsed;
                (response.decode::<T>(), latency)
            }
            Err(e) => (Err(e), started.elapsed()),
        };

        self.metrics.record_request(latency, result.is_ok()).await;

        if let Err(TransportError::Decode(msg)) = &result {
            tracing::error!(request = %request, error = %msg, "Malformed upstream payload");
        }

        result
    }

    /// Top coins by market cap, one page at a time
    ///
    /// Rows come back in upstream order (descending market cap) and carry the
    /// 7-day sparkline plus 24h/7d/30d change.
    pub async fn list_top_coins(
        &self,
        page: u32,
        page_size: u32,
        currency: &str,
    ) -> Result<Vec<CoinSummary>, MarketDataError> {
        validate_page(page, page_size)?;
        let currency = validate_currency(currency)?;

        let request = ApiRequest::new(MARKETS_ENDPOINT)
            .param("vs_currency", &currency)
            .param("order", "market_cap_desc")
            .param("per_page", page_size)
            .param("page", page)
            .param("sparkline", true)
            .param("price_change_percentage", LISTING_CHANGE_WINDOWS);

        let rows: Vec<MarketRow> = self.fetch(&request).await?;
        tracing::debug!(page, page_size, count = rows.len(), "Fetched top coins");

        Ok(rows.into_iter().map(CoinSummary::from).collect())
    }

    /// Full detail for one coin, priced in the default currency
    pub async fn get_coin_detail(&self, id: &str) -> Result<CoinDetail, MarketDataError> {
        let id = validate_id(id)?;

        let request = ApiRequest::new(coin_endpoint(id, None))
            .param("localization", false)
            .param("tickers", false)
            .param("market_data", true)
            .param("community_data", true)
            .param("developer_data", false)
            .param("sparkline", false);

        let detail: DetailResponse = self.fetch(&request).await.map_err(|e| not_found(e, id))?;

        Ok(detail.into_detail(&self.default_currency))
    }

    /// Price history for one coin over `window`
    pub async fn get_market_chart(
        &self,
        id: &str,
        window: ChartWindow,
        currency: &str,
    ) -> Result<MarketChartSeries, MarketDataError> {
        let id = validate_id(id)?;
        let currency = validate_currency(currency)?;

        let request = ApiRequest::new(coin_endpoint(id, Some("market_chart")))
            .param("vs_currency", &currency)
            .param("days", window.days_param());

        let chart: MarketChartResponse =
            self.fetch(&request).await.map_err(|e| not_found(e, id))?;

        let series = chart.into_series(id, window, &currency).map_err(|e| {
            tracing::error!(id, days = %window, error = %e, "Unusable market chart payload");
            e
        })?;
        tracing::debug!(id, days = %window, points = series.len(), "Fetched market chart");

        Ok(series)
    }

    /// Free-text search, hydrated into full market rows
    ///
    /// Only the first ten matches are hydrated. A blank query or a search
    /// with no matches returns an empty list without the hydrate call.
    pub async fn search_coins(&self, query: &str) -> Result<Vec<CoinSummary>, MarketDataError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let request = ApiRequest::new(SEARCH_ENDPOINT).param("query", query);
        let response: SearchResponse = self.fetch(&request).await?;

        let mut seen = BTreeSet::new();
        let ids: Vec<String> = response
            .coins
            .into_iter()
            .map(|coin| coin.id)
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .take(SEARCH_HYDRATE_LIMIT)
            .collect();

        if ids.is_empty() {
            tracing::debug!(query, "Search returned no matches");
            return Ok(Vec::new());
        }

        self.fetch_markets_by_ids(&ids).await
    }

    /// Market rows for an arbitrary set of coin ids, in one batched call
    ///
    /// An empty set returns immediately without touching the network.
    pub async fn get_coins_by_ids<I, S>(&self, ids: I) -> Result<Vec<CoinSummary>, MarketDataError>
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
            return Ok(Vec::new());
        }

        let ids: Vec<String> = ids.into_iter().collect();
        self.fetch_markets_by_ids(&ids).await
    }

    async fn fetch_markets_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<CoinSummary>, MarketDataError> {
        if ids.len() > MAX_PAGE_SIZE as usize {
            tracing::warn!(
                requested = ids.len(),
                max = MAX_PAGE_SIZE,
                "Batch exceeds upstream page size, extra ids will be dropped"
            );
        }

        let request = ApiRequest::new(MARKETS_ENDPOINT)
            .param("vs_currency", &self.default_currency)
            .param("ids", ids.join(","))
            .param("order", "market_cap_desc")
            .param("per_page", ids.len().min(MAX_PAGE_SIZE as usize))
            .param("page", 1)
            .param("sparkline", true)
            .param("price_change_percentage", BATCH_CHANGE_WINDOWS);

        let rows: Vec<MarketRow> = self.fetch(&request).await?;
        tracing::debug!(requested = ids.len(), count = rows.len(), "Fetched coins by id");

        Ok(rows.into_iter().map(CoinSummary::from).collect())
    }
}

fn coin_endpoint(id: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{}/{}/{}", COINS_ENDPOINT, urlencoding::encode(id), suffix),
        None => format!("{}/{}", COINS_ENDPOINT, urlencoding::encode(id)),
    }
}

/// Maps a 404 on a per-coin endpoint to `NotFound`
fn not_found(err: TransportError, id: &str) -> MarketDataError {
    match err {
        TransportError::Http { status: 404, .. } => MarketDataError::not_found(id),
        other => other.into(),
    }
}

fn validate_page(page: u32, page_size: u32) -> Result<(), MarketDataError> {
    if page == 0 {
        return Err(MarketDataError::invalid_argument("page must be at least 1"));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(MarketDataError::invalid_argument(format!(
            "page size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok(())
}

fn validate_currency(currency: &str) -> Result<String, MarketDataError> {
    let currency = currency.trim().to_lowercase();
    if currency.is_empty() {
        return Err(MarketDataError::invalid_argument("currency must not be empty"));
    }
    Ok(currency)
}

fn validate_id(id: &str) -> Result<&str, MarketDataError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(MarketDataError::invalid_argument("coin id must not be empty"));
    }
    Ok(id)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::clock::mock::ManualClock;
    use crate::transport::mock::MockTransport;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn client(transport: Arc<MockTransport>) -> MarketDataClient {
        MarketDataClient::with_transport_and_clock(
            transport,
            &MarketDataConfig::default(),
            Arc::new(ManualClock::new()),
        )
    }

    #[tokio::test]
    async fn test_list_top_coins_sends_every_documented_param() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/coins/markets", market_rows(&["bitcoin", "ethereum"]));
        let client = client(transport.clone());

        let coins = client.list_top_coins(1, 20, "USD").await.unwrap();

        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id, "bitcoin");
        assert!(coins[0].market_cap > coins[1].market_cap);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].params,
            vec![
                ("vs_currency", "usd".to_string()),
                ("order", "market_cap_desc".to_string()),
                ("per_page", "20".to_string()),
                ("page", "1".to_string()),
                ("sparkline", "true".to_string()),
                ("price_change_percentage", "24h,7d,30d".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_transport() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone());

        assert!(matches!(
            client.list_top_coins(0, 20, "usd").await,
            Err(MarketDataError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.list_top_coins(1, 251, "usd").await,
            Err(MarketDataError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.list_top_coins(1, 20, " ").await,
            Err(MarketDataError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.get_coin_detail("").await,
            Err(MarketDataError::InvalidArgument(_))
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_coin_detail_params_and_not_found() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/coins/bitcoin", detail("bitcoin"));
        transport.fail(
            "/coins/nope",
            TransportError::Http {
                status: 404,
                body: r#"{"error":"coin not found"}"#.to_string(),
            },
        );
        let client = client(transport.clone());

        let coin = client.get_coin_detail("bitcoin").await.unwrap();
        assert_eq!(coin.id(), "bitcoin");
        assert_eq!(coin.summary.current_price, 10.0);
        assert_eq!(
            transport.requests()[0].query_string(),
            "localization=false&tickers=false&market_data=true&community_data=true\
             &developer_data=false&sparkline=false"
        );

        let err = client.get_coin_detail("nope").await.unwrap_err();
        assert_eq!(err, MarketDataError::not_found("nope"));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_market_chart_requests_window() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/coins/bitcoin/market_chart", chart(288));
        let client = client(transport.clone());

        let series = client
            .get_market_chart("bitcoin", ChartWindow::Max, "usd")
            .await
            .unwrap();

        assert_eq!(series.len(), 288);
        assert_eq!(series.window, ChartWindow::Max);
        let request = &transport.requests()[0];
        assert_eq!(request.get("days"), Some("max"));
        assert_eq!(request.get("vs_currency"), Some("usd"));
    }

    /// Collects formatted log lines emitted on the current thread
    fn capture_logs() -> (Arc<Mutex<Vec<u8>>>, tracing::subscriber::DefaultGuard) {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_ansi(false)
            .with_writer(move || LogWriter(writer.clone()))
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    struct LogWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_empty_chart_is_a_logged_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/coins/bitcoin/market_chart", chart(0));
        let client = client(transport);
        let (logs, _guard) = capture_logs();

        let err = client
            .get_market_chart("bitcoin", ChartWindow::OneDay, "usd")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Decode(_)));

        let logs = String::from_utf8(logs.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("ERROR"));
        assert!(logs.contains("Unusable market chart payload"));
        assert!(logs.contains("bitcoin"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_decode_error() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/coins/markets", json!({ "unexpected": true }));
        let client = client(transport);

        let err = client.list_top_coins(1, 20, "usd").await.unwrap_err();
        assert!(matches!(err, MarketDataError::Decode(_)));
        assert_eq!(client.metrics().await.failed_requests, 1);
    }

    #[tokio::test]
    async fn test_search_blank_query_makes_no_calls() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone());

        assert!(client.search_coins("").await.unwrap().is_empty());
        assert!(client.search_coins("   ").await.unwrap().is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_search_without_matches_skips_hydration() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/search", json!({ "coins": [], "exchanges": [] }));
        let client = client(transport.clone());

        assert!(client.search_coins("zzzz").await.unwrap().is_empty());
        assert_eq!(transport.calls_to("/search"), 1);
        assert_eq!(transport.calls_to("/coins/markets"), 0);
    }

    #[tokio::test]
    async fn test_search_hydrates_first_ten_matches() {
        let matches: Vec<_> = (0..12)
            .map(|i| json!({ "id": format!("coin-{}", i), "name": "Coin", "symbol": "C" }))
            .collect();
        let transport = Arc::new(MockTransport::new());
        transport.respond("/search", json!({ "coins": matches }));
        transport.respond("/coins/markets", market_rows(&["coin-0", "coin-1"]));
        let client = client(transport.clone());

        let coins = client.search_coins(" coin ").await.unwrap();
        assert_eq!(coins.len(), 2);

        let requests = transport.requests();
        assert_eq!(requests[0].get("query"), Some("coin"));
        let ids = requests[1].get("ids").unwrap();
        assert_eq!(ids.split(',').count(), 10);
        assert!(ids.starts_with("coin-0,coin-1"));
        assert!(!ids.contains("coin-10"));
        assert_eq!(requests[1].get("sparkline"), Some("true"));
    }

    #[tokio::test]
    async fn test_coins_by_ids_empty_set_short_circuits() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone());

        let coins = client.get_coins_by_ids(Vec::<String>::new()).await.unwrap();
        assert!(coins.is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_coins_by_ids_single_batched_call() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/coins/markets", market_rows(&["bitcoin", "solana"]));
        let client = client(transport.clone());

        let coins = client
            .get_coins_by_ids(["solana", "bitcoin", "solana"])
            .await
            .unwrap();

        assert_eq!(coins.len(), 2);
        assert_eq!(transport.call_count(), 1);
        let request = &transport.requests()[0];
        assert_eq!(request.get("ids"), Some("bitcoin,solana"));
        assert_eq!(request.get("per_page"), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_excludes_cooldown() {
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(100)));
        transport.fail(
            "/coins/markets",
            TransportError::Http {
                status: 429,
                body: String::new(),
            },
        );
        transport.respond("/coins/markets", market_rows(&["bitcoin"]));
        let client = MarketDataClient::with_transport(transport, &MarketDataConfig::default());

        let started = tokio::time::Instant::now();
        client.list_top_coins(1, 20, "usd").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(60));

        let metrics = client.metrics().await;
        assert_eq!(metrics.throttled_requests, 1);
        assert!((metrics.latency_p50_ms - 100.0).abs() < 1e-6);
        assert!((metrics.latency_p99_ms - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_throttled_call_recovers_transparently() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(
            "/coins/markets",
            TransportError::Http {
                status: 429,
                body: String::new(),
            },
        );
        transport.respond("/coins/markets", market_rows(&["bitcoin"]));
        let client = client(transport.clone());

        let coins = client.list_top_coins(1, 20, "usd").await.unwrap();
        assert_eq!(coins.len(), 1);
        assert_eq!(transport.call_count(), 2);

        let metrics = client.metrics().await;
        assert_eq!(metrics.throttled_requests, 1);
        assert_eq!(metrics.total_requests, 1);
    }
}
