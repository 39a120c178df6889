//! Domain types for market data

use crate::error::MarketDataError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One row of the market listing
///
/// A snapshot: newer fetches produce new values rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSummary {
    /// Upstream identifier, stable across sessions (e.g. `bitcoin`)
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    /// Price in the requested quote currency
    pub current_price: f64,
    pub market_cap: f64,
    pub market_cap_rank: Option<u32>,
    /// 24h trading volume
    pub total_volume: f64,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_7d: Option<f64>,
    pub price_change_percentage_30d: Option<f64>,
    /// Seven days of price samples, oldest first
    pub sparkline_7d: Option<Vec<f64>>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// External links published for a coin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinLinks {
    pub homepage: Vec<String>,
    pub blockchain_explorers: Vec<String>,
    pub forums: Vec<String>,
    pub github_repos: Vec<String>,
    pub subreddit: Option<String>,
    pub twitter_handle: Option<String>,
}

impl CoinLinks {
    /// Full twitter URL, if a handle is published
    pub fn twitter_url(&self) -> Option<String> {
        self.twitter_handle
            .as_ref()
            .map(|handle| format!("https://twitter.com/{}", handle))
    }
}

/// Circulating, total and max supply; each may be unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyMetrics {
    pub circulating: Option<f64>,
    pub total: Option<f64>,
    pub max: Option<f64>,
}

/// All-time high or low
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceExtreme {
    pub price: f64,
    pub at: Option<DateTime<Utc>>,
}

/// Full detail for a single coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub summary: CoinSummary,
    /// English description as published upstream. Untrusted HTML: sanitize
    /// before rendering.
    pub description_html: Option<String>,
    pub links: CoinLinks,
    pub supply: SupplyMetrics,
    pub all_time_high: Option<PriceExtreme>,
    pub all_time_low: Option<PriceExtreme>,
    pub categories: Vec<String>,
}

impl CoinDetail {
    /// Upstream coin id
    pub fn id(&self) -> &str {
        &self.summary.id
    }
}

/// Time span covered by a chart series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartWindow {
    OneDay,
    #[default]
    SevenDays,
    ThirtyDays,
    NinetyDays,
    OneYear,
    Max,
}

impl ChartWindow {
    /// Every supported window, shortest first
    pub fn all() -> &'static [ChartWindow] {
        &[
            ChartWindow::OneDay,
            ChartWindow::SevenDays,
            ChartWindow::ThirtyDays,
            ChartWindow::NinetyDays,
            ChartWindow::OneYear,
            ChartWindow::Max,
        ]
    }

    /// Value sent as the upstream `days` parameter
    pub fn days_param(&self) -> &'static str {
        match self {
            ChartWindow::OneDay => "1",
            ChartWindow::SevenDays => "7",
            ChartWindow::ThirtyDays => "30",
            ChartWindow::NinetyDays => "90",
            ChartWindow::OneYear => "365",
            ChartWindow::Max => "max",
        }
    }

    /// Spacing upstream uses between samples for this window
    ///
    /// Five-minute samples for a single day, hourly up to 90 days and
    /// daily beyond that.
    pub fn granularity(&self) -> Duration {
        match self {
            ChartWindow::OneDay => Duration::from_secs(5 * 60),
            ChartWindow::SevenDays | ChartWindow::ThirtyDays | ChartWindow::NinetyDays => {
                Duration::from_secs(60 * 60)
            }
            ChartWindow::OneYear | ChartWindow::Max => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl fmt::Display for ChartWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.days_param())
    }
}

impl FromStr for ChartWindow {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" => Ok(ChartWindow::OneDay),
            "7" => Ok(ChartWindow::SevenDays),
            "30" => Ok(ChartWindow::ThirtyDays),
            "90" => Ok(ChartWindow::NinetyDays),
            "365" => Ok(ChartWindow::OneYear),
            "max" => Ok(ChartWindow::Max),
            other => Err(MarketDataError::invalid_argument(format!(
                "unsupported chart window: {}",
                other
            ))),
        }
    }
}

impl TryFrom<u32> for ChartWindow {
    type Error = MarketDataError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        days.to_string().parse()
    }
}

/// One (timestamp, price) sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Price history for one coin over one window
///
/// Never empty: a fetch that yields no samples is reported as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketChartSeries {
    pub coin_id: String,
    pub window: ChartWindow,
    pub currency: String,
    /// Samples ordered by timestamp, oldest first
    pub points: Vec<PricePoint>,
}

impl MarketChartSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Oldest sample
    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    /// Most recent sample
    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Percent change from the first to the last sample
    pub fn change_percentage(&self) -> Option<f64> {
        let first = self.first()?.price;
        let last = self.last()?.price;
        if first == 0.0 {
            return None;
        }
        Some((last - first) / first * 100.0)
    }

    /// Mean gap between consecutive samples
    pub fn sample_spacing(&self) -> Option<Duration> {
        let first = self.first()?.timestamp;
        let last = self.last()?.timestamp;
        let gaps = u32::try_from(self.points.len().checked_sub(1)?).ok()?;
        if gaps == 0 {
            return None;
        }
        (last - first).to_std().ok().map(|span| span / gaps)
    }

    /// True when samples are more than twice as far apart as the window's
    /// granularity
    pub fn is_sparse(&self) -> bool {
        self.sample_spacing()
            .is_some_and(|spacing| spacing > self.window.granularity() * 2)
    }
}

/// Overall system health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// System is healthy and all components are operational
    Healthy,
    /// System is degraded but still functional
    Degraded,
    /// System is unhealthy and requires attention
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: std::collections::HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
