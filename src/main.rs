use std::sync::Arc;

use candlekeep::CandlekeepError;
use candlekeep::cache::{CacheSync, RedisStore};
use candlekeep::client::{BinanceClient, MarketDataClient};
use candlekeep::config::fetch_config;
use candlekeep::dispatch::{ChannelConsumer, DispatchGate};
use candlekeep::engine::AggregationEngine;
use candlekeep::feed::{FeedManager, stream_url};
use candlekeep::reconcile::{ColdStartReconciler, DEFAULT_REFETCH_PAUSE};
use candlekeep::registry::Registry;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), CandlekeepError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let config = fetch_config()?;

    let client = Arc::new(BinanceClient::new(&config.rest_url, &config.quote_asset)?);
    let symbols = match &config.symbols {
        Some(symbols) => symbols.clone(),
        None => client.list_symbols().await?,
    };
    info!(
        symbols = symbols.len(),
        timeframes = config.timeframes.len(),
        "Tracking series"
    );

    let store = Arc::new(RedisStore::connect(&config.redis_url).await?);
    let registry = Arc::new(Registry::new(
        symbols.clone(),
        config.timeframes.clone(),
        config.max_candles,
    ));

    // Stand-in worker engine: report every closed series it receives.
    let (consumer, mut closed) = ChannelConsumer::channel();
    tokio::spawn(async move {
        while let Some(snapshot) = closed.recv().await {
            info!(
                symbol = snapshot.symbol,
                timeframe = %snapshot.timeframe,
                len = snapshot.len(),
                close = snapshot.close.first().copied().unwrap_or_default(),
                "Series closed"
            );
        }
    });

    let dispatch = DispatchGate::new(Arc::new(consumer), config.min_dispatch_len);
    let cache_sync = CacheSync::new(store, Arc::clone(&registry), &config.broker);
    let engine = Arc::new(AggregationEngine::new(
        Arc::clone(&registry),
        dispatch,
        cache_sync.clone(),
    ));
    let reconciler = ColdStartReconciler::new(
        client,
        Arc::clone(&registry),
        cache_sync,
        config.batch_size,
        DEFAULT_REFETCH_PAUSE,
    );

    let url = stream_url(&config.websocket_url, &symbols, registry.base_timeframe());
    FeedManager::new(url, engine, reconciler, config.stale_after)
        .run()
        .await;

    Ok(())
}
