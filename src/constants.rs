//! Constants for the coin market client
//!
//! Compile-time defaults for the client. `MarketDataConfig::from_env` can
//! override a few of them at runtime; everything else is fixed here.

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Ranked market listing, also used for batched lookups by id
pub const MARKETS_ENDPOINT: &str = "/coins/markets";

/// Prefix for per-coin endpoints (`/coins/{id}`, `/coins/{id}/market_chart`)
pub const COINS_ENDPOINT: &str = "/coins";

/// Free-text coin search
pub const SEARCH_ENDPOINT: &str = "/search";

/// HTTP request timeout (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent for HTTP requests
pub const USER_AGENT: &str = "coin-market-sdk/0.1.0";

/// How long to wait after a 429 before re-issuing the request (in seconds)
pub const RATE_LIMIT_COOLDOWN_SECS: u64 = 60;

/// Quote currency used when the caller does not pick one
pub const DEFAULT_CURRENCY: &str = "usd";

/// Rows per page for the market listing
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound CoinGecko accepts for `per_page`
pub const MAX_PAGE_SIZE: u32 = 250;

/// Number of search matches hydrated into full market rows
pub const SEARCH_HYDRATE_LIMIT: usize = 10;

/// Freshness window for top-coin listings (in seconds)
pub const TOP_COINS_TTL_SECS: u64 = 5 * 60;

/// Freshness window for coin detail (in seconds)
pub const COIN_DETAIL_TTL_SECS: u64 = 2 * 60;

/// Freshness window for chart series (in seconds)
pub const MARKET_CHART_TTL_SECS: u64 = 2 * 60;

/// Freshness window for search results (in seconds)
pub const SEARCH_TTL_SECS: u64 = 5 * 60;

/// Freshness window for watchlist batches (in seconds)
pub const WATCHLIST_TTL_SECS: u64 = 2 * 60;

/// Storage key the watchlist is persisted under
pub const WATCHLIST_STORAGE_KEY: &str = "watchlist";

/// Environment variable overriding the API base URL
pub const ENV_API_URL: &str = "MARKET_DATA_API_URL";

/// Environment variable overriding the default quote currency
pub const ENV_CURRENCY: &str = "MARKET_DATA_CURRENCY";

/// Environment variable capping rate-limit retries (unset = unbounded)
pub const ENV_MAX_RETRIES: &str = "MARKET_DATA_MAX_RETRIES";
