//! CoinGecko payload shapes and their conversion into domain types

use crate::{
    error::MarketDataError,
    types::{
        ChartWindow, CoinDetail, CoinLinks, CoinSummary, MarketChartSeries, PriceExtreme,
        PricePoint, SupplyMetrics,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Per-currency values (`{"usd": 1.0, "eur": 0.9}`); upstream sends `null`
/// for currencies it cannot price.
type CurrencyMap<T> = HashMap<String, Option<T>>;

/// Deserializes a list of strings, dropping `null` and blank entries
///
/// CoinGecko pads link arrays with empty strings.
fn non_blank_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn pick<T: Copy>(map: &Option<CurrencyMap<T>>, currency: &str) -> Option<T> {
    map.as_ref()?.get(currency).copied().flatten()
}

#[derive(Debug, Deserialize)]
pub struct Sparkline {
    #[serde(default)]
    pub price: Vec<f64>,
}

/// Row of `/coins/markets`
#[derive(Debug, Deserialize)]
pub struct MarketRow {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub total_volume: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_24h_in_currency: Option<f64>,
    pub price_change_percentage_7d_in_currency: Option<f64>,
    pub price_change_percentage_30d_in_currency: Option<f64>,
    pub sparkline_in_7d: Option<Sparkline>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<MarketRow> for CoinSummary {
    fn from(row: MarketRow) -> Self {
        Self {
            id: row.id,
            symbol: row.symbol,
            name: row.name,
            image: non_blank(row.image),
            current_price: row.current_price.unwrap_or_default(),
            market_cap: row.market_cap.unwrap_or_default(),
            market_cap_rank: row.market_cap_rank,
            total_volume: row.total_volume.unwrap_or_default(),
            price_change_percentage_24h: row
                .price_change_percentage_24h_in_currency
                .or(row.price_change_percentage_24h),
            price_change_percentage_7d: row.price_change_percentage_7d_in_currency,
            price_change_percentage_30d: row.price_change_percentage_30d_in_currency,
            sparkline_7d: row
                .sparkline_in_7d
                .map(|s| s.price)
                .filter(|prices| !prices.is_empty()),
            last_updated: row.last_updated,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailImage {
    pub thumb: Option<String>,
    pub small: Option<String>,
    pub large: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailRepos {
    #[serde(default, deserialize_with = "non_blank_strings")]
    pub github: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailLinks {
    #[serde(default, deserialize_with = "non_blank_strings")]
    pub homepage: Vec<String>,
    #[serde(default, deserialize_with = "non_blank_strings")]
    pub blockchain_site: Vec<String>,
    #[serde(default, deserialize_with = "non_blank_strings")]
    pub official_forum_url: Vec<String>,
    pub subreddit_url: Option<String>,
    pub twitter_screen_name: Option<String>,
    #[serde(default)]
    pub repos_url: DetailRepos,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailMarketData {
    pub current_price: Option<CurrencyMap<f64>>,
    pub market_cap: Option<CurrencyMap<f64>>,
    pub total_volume: Option<CurrencyMap<f64>>,
    pub ath: Option<CurrencyMap<f64>>,
    pub ath_date: Option<CurrencyMap<DateTime<Utc>>>,
    pub atl: Option<CurrencyMap<f64>>,
    pub atl_date: Option<CurrencyMap<DateTime<Utc>>>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_7d: Option<f64>,
    pub price_change_percentage_30d: Option<f64>,
    pub price_change_percentage_24h_in_currency: Option<CurrencyMap<f64>>,
    pub price_change_percentage_7d_in_currency: Option<CurrencyMap<f64>>,
    pub price_change_percentage_30d_in_currency: Option<CurrencyMap<f64>>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub sparkline_7d: Option<Sparkline>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Body of `/coins/{id}`
#[derive(Debug, Deserialize)]
pub struct DetailResponse {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub image: DetailImage,
    pub description: Option<HashMap<String, Option<String>>>,
    #[serde(default)]
    pub links: DetailLinks,
    #[serde(default, deserialize_with = "non_blank_strings")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub market_data: DetailMarketData,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DetailResponse {
    /// Converts to a detail priced in `currency`
    pub fn into_detail(self, currency: &str) -> CoinDetail {
        let md = &self.market_data;

        let extreme = |price: &Option<CurrencyMap<f64>>, at: &Option<CurrencyMap<DateTime<Utc>>>| {
            pick(price, currency).map(|price| PriceExtreme {
                price,
                at: pick(at, currency),
            })
        };

        let summary = CoinSummary {
            id: self.id,
            symbol: self.symbol,
            name: self.name,
            image: non_blank(self.image.large.or(self.image.small).or(self.image.thumb)),
            current_price: pick(&md.current_price, currency).unwrap_or_default(),
            market_cap: pick(&md.market_cap, currency).unwrap_or_default(),
            market_cap_rank: self.market_cap_rank,
            total_volume: pick(&md.total_volume, currency).unwrap_or_default(),
            price_change_percentage_24h: pick(&md.price_change_percentage_24h_in_currency, currency)
                .or(md.price_change_percentage_24h),
            price_change_percentage_7d: pick(&md.price_change_percentage_7d_in_currency, currency)
                .or(md.price_change_percentage_7d),
            price_change_percentage_30d: pick(&md.price_change_percentage_30d_in_currency, currency)
                .or(md.price_change_percentage_30d),
            sparkline_7d: md
                .sparkline_7d
                .as_ref()
                .map(|s| s.price.clone())
                .filter(|prices| !prices.is_empty()),
            last_updated: md.last_updated.or(self.last_updated),
        };

        let description_html = self
            .description
            .and_then(|mut by_lang| by_lang.remove("en").flatten())
            .and_then(|text| non_blank(Some(text)));

        CoinDetail {
            summary,
            description_html,
            links: CoinLinks {
                homepage: self.links.homepage,
                blockchain_explorers: self.links.blockchain_site,
                forums: self.links.official_forum_url,
                github_repos: self.links.repos_url.github,
                subreddit: non_blank(self.links.subreddit_url),
                twitter_handle: non_blank(self.links.twitter_screen_name),
            },
            supply: SupplyMetrics {
                circulating: md.circulating_supply,
                total: md.total_supply,
                max: md.max_supply,
            },
            all_time_high: extreme(&md.ath, &md.ath_date),
            all_time_low: extreme(&md.atl, &md.atl_date),
            categories: self.categories,
        }
    }
}

/// Body of `/coins/{id}/market_chart`
#[derive(Debug, Deserialize)]
pub struct MarketChartResponse {
    /// `[timestamp_ms, price]` pairs
    pub prices: Vec<(f64, Option<f64>)>,
}

impl MarketChartResponse {
    /// Builds a chart series, rejecting payloads with no usable samples
    pub fn into_series(
        self,
        coin_id: &str,
        window: ChartWindow,
        currency: &str,
    ) -> Result<MarketChartSeries, MarketDataError> {
        let mut points: Vec<PricePoint> = self
            .prices
            .into_iter()
            .filter_map(|(ts, price)| {
                let timestamp = DateTime::<Utc>::from_timestamp_millis(ts as i64)?;
                Some(PricePoint {
                    timestamp,
                    price: price?,
                })
            })
            .collect();

        if points.is_empty() {
            return Err(MarketDataError::Decode(format!(
                "market chart for {} ({} days) has no price samples",
                coin_id, window
            )));
        }

        points.sort_by_key(|p| p.timestamp);

        let series = MarketChartSeries {
            coin_id: coin_id.to_string(),
            window,
            currency: currency.to_string(),
            points,
        };

        if series.is_sparse() {
            tracing::debug!(
                coin_id,
                days = %window,
                spacing = ?series.sample_spacing(),
                expected = ?window.granularity(),
                "Chart samples coarser than the window's granularity"
            );
        }

        Ok(series)
    }
}

/// Match from `/search`
#[derive(Debug, Deserialize)]
pub struct SearchCoin {
    pub id: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub market_cap_rank: Option<u32>,
}

/// Body of `/search`
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub coins: Vec<SearchCoin>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_market_row_prefers_in_currency_change() {
        let row: MarketRow = serde_json::from_value(json!({
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "image": "https://img/btc.png",
            "current_price": 65000.5,
            "market_cap": null,
            "market_cap_rank": 1,
            "total_volume": 1.5e10,
            "price_change_percentage_24h": 1.0,
            "price_change_percentage_24h_in_currency": 1.25,
            "price_change_percentage_7d_in_currency": -3.5,
            "price_change_percentage_30d_in_currency": null,
            "sparkline_in_7d": { "price": [1.0, 2.0, 3.0] },
            "last_updated": "2024-05-01T12:00:00.000Z"
        }))
        .unwrap();

        let coin = CoinSummary::from(row);
        assert_eq!(coin.market_cap, 0.0);
        assert_eq!(coin.price_change_percentage_24h, Some(1.25));
        assert_eq!(coin.price_change_percentage_7d, Some(-3.5));
        assert_eq!(coin.price_change_percentage_30d, None);
        assert_eq!(coin.sparkline_7d, Some(vec![1.0, 2.0, 3.0]));
        assert!(coin.last_updated.is_some());
    }

    #[test]
    fn test_detail_picks_currency_and_cleans_links() {
        let detail: DetailResponse = serde_json::from_value(json!({
            "id": "ethereum",
            "symbol": "eth",
            "name": "Ethereum",
            "market_cap_rank": 2,
            "image": { "thumb": "t", "small": "s", "large": "l" },
            "description": { "en": "<p>World computer</p>", "de": "" },
            "links": {
                "homepage": ["https://ethereum.org", "", ""],
                "blockchain_site": ["https://etherscan.io", null],
                "official_forum_url": [""],
                "subreddit_url": "https://reddit.com/r/ethereum",
                "twitter_screen_name": "ethereum",
                "repos_url": { "github": ["https://github.com/ethereum/go-ethereum"] }
            },
            "categories": ["Smart Contract Platform", null],
            "market_data": {
                "current_price": { "usd": 3000.0, "eur": 2800.0 },
                "market_cap": { "usd": 3.6e11, "eur": null },
                "total_volume": { "usd": 1.0e10 },
                "ath": { "usd": 4878.26 },
                "ath_date": { "usd": "2021-11-10T14:24:19.604Z" },
                "atl": { "usd": 0.43 },
                "atl_date": { "usd": "2015-10-20T00:00:00.000Z" },
                "price_change_percentage_24h": 2.0,
                "price_change_percentage_7d_in_currency": { "eur": 4.0 },
                "circulating_supply": 120000000.0,
                "total_supply": null,
                "max_supply": null
            }
        }))
        .unwrap();

        let eur = detail.into_detail("eur");
        assert_eq!(eur.summary.current_price, 2800.0);
        assert_eq!(eur.summary.market_cap, 0.0);
        assert_eq!(eur.summary.image.as_deref(), Some("l"));
        assert_eq!(eur.summary.price_change_percentage_24h, Some(2.0));
        assert_eq!(eur.summary.price_change_percentage_7d, Some(4.0));
        assert_eq!(eur.description_html.as_deref(), Some("<p>World computer</p>"));
        assert_eq!(eur.links.homepage, vec!["https://ethereum.org"]);
        assert_eq!(eur.links.blockchain_explorers, vec!["https://etherscan.io"]);
        assert!(eur.links.forums.is_empty());
        assert_eq!(eur.categories, vec!["Smart Contract Platform"]);
        assert_eq!(eur.supply.circulating, Some(120000000.0));
        assert_eq!(eur.supply.max, None);
        assert!(eur.all_time_high.is_none());
    }

    #[test]
    fn test_detail_all_time_extremes() {
        let detail: DetailResponse = serde_json::from_value(json!({
            "id": "ethereum",
            "symbol": "eth",
            "name": "Ethereum",
            "market_data": {
                "ath": { "usd": 4878.26 },
                "ath_date": { "usd": "2021-11-10T14:24:19.604Z" },
                "atl": { "usd": 0.43 }
            }
        }))
        .unwrap();

        let usd = detail.into_detail("usd");
        let ath = usd.all_time_high.unwrap();
        assert_eq!(ath.price, 4878.26);
        assert!(ath.at.is_some());
        let atl = usd.all_time_low.unwrap();
        assert_eq!(atl.price, 0.43);
        assert!(atl.at.is_none());
    }

    #[test]
    fn test_chart_sorts_and_rejects_empty() {
        let response: MarketChartResponse = serde_json::from_value(json!({
            "prices": [[1714564800000.0, 2.0], [1714561200000.0, 1.0], [1714568400000.0, null]],
            "market_caps": [],
            "total_volumes": []
        }))
        .unwrap();

        let series = response
            .into_series("bitcoin", ChartWindow::OneDay, "usd")
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].price, 1.0);
        assert_eq!(series.points[1].price, 2.0);

        let empty: MarketChartResponse =
            serde_json::from_value(json!({ "prices": [] })).unwrap();
        let err = empty
            .into_series("bitcoin", ChartWindow::Max, "usd")
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Decode(_)));
    }
}
