//! # Coin Market SDK
//!
//! Cryptocurrency market data from the CoinGecko public API: a ranked
//! listing, per-coin detail and price charts, free-text search and a
//! persisted watchlist.
//!
//! Requests go through a rate-limit guard that waits out HTTP 429 responses
//! and retries, and results are served from a query cache that keeps values
//! fresh for a per-operation window, serves stale values while refreshing in
//! the background, and merges concurrent identical requests.
//!
//! ## Usage
//!
//! The application root constructs the service and the watchlist once and
//! shares them:
//!
//! ```no_run
//! use coin_market_sdk::{
//!     ChartWindow, FileStorage, MarketDataConfig, MarketDataService, WatchlistStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(MarketDataService::new(MarketDataConfig::from_env())?);
//! let watchlist = Arc::new(WatchlistStore::load(Arc::new(FileStorage::new(".coin-market"))));
//!
//! // First page of the ranked listing
//! for coin in service.top_coins(1, 20, "usd").await?.iter() {
//!     println!(
//!         "{:>4} {:<10} ${:.2}",
//!         coin.market_cap_rank.unwrap_or(0),
//!         coin.symbol,
//!         coin.current_price
//!     );
//! }
//!
//! // Weekly chart for one coin
//! let chart = service.market_chart("bitcoin", ChartWindow::SevenDays, "usd").await?;
//! println!("7d change: {:?}", chart.change_percentage());
//!
//! // Starred coins
//! watchlist.add("bitcoin")?;
//! let starred = service.watchlist_coins(&watchlist).await?;
//! println!("{} coins watched", starred.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod pager;
pub mod service;
pub mod transport;
pub mod types;
pub mod watchlist;
pub mod wire;

// Re-export commonly used types
pub use cache::{CacheStats, QueryCache, QueryKey};
pub use client::MarketDataClient;
pub use config::{CacheTtls, MarketDataConfig, RateLimitConfig};
pub use error::{MarketDataError, StorageError, TransportError};
pub use metrics::ProviderMetrics;
pub use pager::{sort_coins, MarketListPager, SortDirection, SortKey};
pub use service::MarketDataService;
pub use transport::{ApiRequest, HttpTransport, RateLimitGuard, RawResponse, Transport};
pub use types::{
    ChartWindow, CoinDetail, CoinLinks, CoinSummary, ComponentHealth, HealthStatus,
    MarketChartSeries, PriceExtreme, PricePoint, SupplyMetrics,
};
pub use watchlist::{FileStorage, KeyValueStorage, MemoryStorage, WatchlistStore};
