use coin_market_sdk::{
    ChartWindow, FileStorage, MarketDataConfig, MarketDataService, MarketListPager, SortDirection,
    SortKey, WatchlistStore,
};
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // 1. Build the service and load the watchlist
    let config = MarketDataConfig::from_env();
    let currency = config.default_currency.clone();
    let service = Arc::new(MarketDataService::new(config)?);
    let state_dir = std::env::temp_dir().join("coin-market-demo");
    let watchlist = WatchlistStore::load(Arc::new(FileStorage::new(&state_dir)));

    println!("Market overview ({}), state in {}", currency, state_dir.display());
    println!("-------------------------------------------");

    // 2. Two pages of the listing, sorted by 24h change
    let mut pager = MarketListPager::new(service.clone(), 10, &currency).with_limit(20);
    let start_api = Instant::now();
    while !pager.is_exhausted() {
        if let Err(e) = pager.load_more().await {
            eprintln!("   {} ({})", e.user_message(), e);
            break;
        }
    }
    println!("1. Loaded {} coins in {:?}", pager.coins().len(), start_api.elapsed());

    for coin in pager
        .sorted(SortKey::Change24h, SortDirection::Descending)
        .iter()
        .take(5)
    {
        println!(
            "   {:<10} ${:>12.2} {:>+7.2}%",
            coin.symbol.to_uppercase(),
            coin.current_price,
            coin.price_change_percentage_24h.unwrap_or(0.0)
        );
    }
    println!();

    // 3. Same page again comes from the cache
    let start_mem = Instant::now();
    service.top_coins(1, 10, &currency).await?;
    println!("2. Cached page served in {:?}", start_mem.elapsed());
    println!();

    // 4. Detail and chart for one coin
    match service.coin_detail("bitcoin").await {
        Ok(detail) => {
            println!("3. {} ({})", detail.summary.name, detail.summary.symbol);
            if let Some(ath) = &detail.all_time_high {
                println!("   All-time high: ${:.2}", ath.price);
            }
        }
        Err(e) => eprintln!("   {}", e.user_message()),
    }
    if let Ok(chart) = service.market_chart("bitcoin", ChartWindow::SevenDays, &currency).await {
        println!(
            "   {} points over {}, change {:+.2}%",
            chart.len(),
            chart.window,
            chart.change_percentage().unwrap_or(0.0)
        );
    }
    println!();

    // 5. Watchlist
    if watchlist.is_empty() {
        watchlist.add("bitcoin")?;
        watchlist.add("ethereum")?;
    }
    let starred = service.watchlist_coins(&watchlist).await?;
    println!("4. Watchlist:");
    for coin in starred.iter() {
        println!("   {:<10} ${:.2}", coin.name, coin.current_price);
    }
    println!();

    println!("-------------------------------------------");
    let stats = service.cache_stats();
    let health = service.health_check().await;
    println!(
        "Cache: {} hits, {} misses, {} coalesced",
        stats.hits, stats.misses, stats.coalesced
    );
    println!("Health: {:?} ({})", health.status, health.message.unwrap_or_default());

    Ok(())
}
