//! Incremental loading of the ranked listing

use crate::{error::MarketDataError, service::MarketDataService, types::CoinSummary};
use std::collections::HashSet;
use std::sync::Arc;

/// Column the listing can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    MarketCap,
    Price,
    Change24h,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Orders `coins` in place; missing values compare as zero
///
/// The sort is stable, so ties keep their upstream (rank) order.
pub fn sort_coins(coins: &mut [CoinSummary], key: SortKey, direction: SortDirection) {
    coins.sort_by(|a, b| {
        let ordering = sort_value(a, key).total_cmp(&sort_value(b, key));
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

fn sort_value(coin: &CoinSummary, key: SortKey) -> f64 {
    let value = match key {
        SortKey::MarketCap => coin.market_cap,
        SortKey::Price => coin.current_price,
        SortKey::Change24h => coin.price_change_percentage_24h.unwrap_or(0.0),
    };
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// Accumulates listing pages for an infinite-scroll view
///
/// Pages are fetched through the service, so revisiting a page within its
/// freshness window costs nothing.
pub struct MarketListPager {
    service: Arc<MarketDataService>,
    currency: String,
    page_size: u32,
    limit: Option<usize>,
    next_page: u32,
    coins: Vec<CoinSummary>,
    seen: HashSet<String>,
    exhausted: bool,
}

impl MarketListPager {
    /// Creates a pager that reads `page_size` coins at a time priced in `currency`
    pub fn new(service: Arc<MarketDataService>, page_size: u32, currency: &str) -> Self {
        Self {
            service,
            currency: currency.to_string(),
            page_size,
            limit: None,
            next_page: 1,
            coins: Vec::new(),
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    /// Stops loading once `limit` coins have been accumulated
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Loads the next page and returns how many new coins were appended
    ///
    /// Returns `Ok(0)` without fetching once the pager is exhausted. On error
    /// the pager stays on the same page so the call can be retried.
    pub async fn load_more(&mut self) -> Result<usize, MarketDataError> {
        if self.exhausted {
            return Ok(0);
        }

        let page = self
            .service
            .top_coins(self.next_page, self.page_size, &self.currency)
            .await?;

        let mut added = 0;
        for coin in page.iter() {
            if self.limit.is_some_and(|limit| self.coins.len() >= limit) {
                break;
            }
            if self.seen.insert(coin.id.clone()) {
                self.coins.push(coin.clone());
                added += 1;
            }
        }

        let short_page = page.len() < self.page_size as usize;
        let limit_reached = self.limit.is_some_and(|limit| self.coins.len() >= limit);
        self.exhausted = short_page || limit_reached;
        self.next_page += 1;

        tracing::debug!(
            page = self.next_page - 1,
            added,
            total = self.coins.len(),
            exhausted = self.exhausted,
            "Loaded listing page"
        );

        Ok(added)
    }

    /// Drops everything loaded so far; the next `load_more` starts at page 1
    pub fn reset(&mut self) {
        self.next_page = 1;
        self.coins.clear();
        self.seen.clear();
        self.exhausted = false;
    }

    /// Coins loaded so far, in rank order
    pub fn coins(&self) -> &[CoinSummary] {
        &self.coins
    }

    /// Copy of the loaded coins ordered for display
    pub fn sorted(&self, key: SortKey, direction: SortDirection) -> Vec<CoinSummary> {
        let mut coins = self.coins.clone();
        sort_coins(&mut coins, key, direction);
        coins
    }

    /// Number of pages loaded since creation or the last reset
    pub fn pages_loaded(&self) -> u32 {
        self.next_page - 1
    }

    /// True once a short page or the limit has been reached
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
