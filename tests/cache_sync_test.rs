//! Incremental cache mirroring.

mod common;

use std::sync::Arc;

use candlekeep::cache::{CacheSync, CandleStore, MemoryStore, cache_key, decode_records, encode_record};
use candlekeep::models::Candle;
use candlekeep::registry::Registry;
use candlekeep::timeframe::Timeframe;

use common::{BROKER, MIN, ReadOnlyStore, T0, contiguous};

const SYMBOL: &str = "ETHUSDT";

fn registry(max_candles: usize) -> Arc<Registry> {
    Arc::new(Registry::new(
        vec![SYMBOL.to_string()],
        vec![Timeframe::M1, Timeframe::M5],
        max_candles,
    ))
}

async fn stored(store: &MemoryStore) -> Vec<Candle> {
    let key = cache_key(BROKER, SYMBOL, Timeframe::M5);
    decode_records(&key, &store.get_all(&key).await.unwrap())
}

#[tokio::test]
async fn test_only_newer_candles_are_pushed() {
    let registry = registry(100);
    let store = Arc::new(MemoryStore::new());
    let sync = CacheSync::new(store.clone(), Arc::clone(&registry), BROKER);

    // In memory: five bars; the store already holds everything up to the third.
    let series = contiguous(Timeframe::M5, T0, 5);
    registry.replace_series(SYMBOL, Timeframe::M5, series.clone());
    let key = cache_key(BROKER, SYMBOL, Timeframe::M5);
    let persisted: Vec<String> = series[2..].iter().map(encode_record).collect();
    store.push_back(&key, &persisted).await.unwrap();

    let pushed = sync.sync(SYMBOL, Timeframe::M5).await.unwrap();

    assert_eq!(pushed, 2);
    assert_eq!(stored(&store).await, series);

    // Nothing new: nothing pushed.
    assert_eq!(sync.sync(SYMBOL, Timeframe::M5).await.unwrap(), 0);
    assert_eq!(store.size(&key).await.unwrap(), 5);
}

#[tokio::test]
async fn test_empty_store_is_seeded_without_head() {
    let registry = registry(100);
    let store = Arc::new(MemoryStore::new());
    let sync = CacheSync::new(store.clone(), Arc::clone(&registry), BROKER);
    let series = contiguous(Timeframe::M5, T0, 4);

    let pushed = sync
        .sync_candles(SYMBOL, Timeframe::M5, &series)
        .await
        .unwrap();

    assert_eq!(pushed, 3);
    assert_eq!(stored(&store).await, series[1..].to_vec());
}

#[tokio::test]
async fn test_store_is_trimmed_to_retention() {
    let registry = registry(3);
    let store = Arc::new(MemoryStore::new());
    let sync = CacheSync::new(store.clone(), Arc::clone(&registry), BROKER);
    let key = cache_key(BROKER, SYMBOL, Timeframe::M5);
    let old: Vec<String> = contiguous(Timeframe::M5, T0 - 25 * MIN, 3)
        .iter()
        .map(encode_record)
        .collect();
    store.push_back(&key, &old).await.unwrap();

    let series = contiguous(Timeframe::M5, T0 - 25 * MIN, 8);
    sync.sync_candles(SYMBOL, Timeframe::M5, &series).await.unwrap();

    assert_eq!(store.size(&key).await.unwrap(), 3);
    assert_eq!(stored(&store).await, series[..3].to_vec());
}

#[tokio::test]
async fn test_base_timeframe_is_never_synced() {
    let registry = registry(100);
    let store = Arc::new(MemoryStore::new());
    let sync = CacheSync::new(store.clone(), Arc::clone(&registry), BROKER);
    let minutes = contiguous(Timeframe::M1, T0, 10);
    registry.replace_series(SYMBOL, Timeframe::M1, minutes.clone());

    assert_eq!(sync.sync(SYMBOL, Timeframe::M1).await.unwrap(), 0);
    assert_eq!(
        sync.sync_candles(SYMBOL, Timeframe::M1, &minutes).await.unwrap(),
        0
    );
    let key = cache_key(BROKER, SYMBOL, Timeframe::M1);
    assert_eq!(store.size(&key).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unreadable_front_record_resets_the_list() {
    let registry = registry(100);
    let store = Arc::new(MemoryStore::new());
    let sync = CacheSync::new(store.clone(), Arc::clone(&registry), BROKER);
    let key = cache_key(BROKER, SYMBOL, Timeframe::M5);
    store
        .push_back(&key, &["garbage".to_string(), "more_garbage".to_string()])
        .await
        .unwrap();

    let series = contiguous(Timeframe::M5, T0, 3);
    let pushed = sync
        .sync_candles(SYMBOL, Timeframe::M5, &series)
        .await
        .unwrap();

    assert_eq!(pushed, 2);
    assert_eq!(stored(&store).await, series[1..].to_vec());
}

#[tokio::test]
async fn test_write_failure_is_reported() {
    let registry = registry(100);
    let sync = CacheSync::new(Arc::new(ReadOnlyStore::new()), Arc::clone(&registry), BROKER);
    let series = contiguous(Timeframe::M5, T0, 3);

    assert!(sync.sync_candles(SYMBOL, Timeframe::M5, &series).await.is_err());
}

#[tokio::test]
async fn test_background_sync_swallows_failures() {
    let registry = registry(100);
    let sync = CacheSync::new(Arc::new(ReadOnlyStore::new()), Arc::clone(&registry), BROKER);
    let handle = sync.spawn_sync(SYMBOL.to_string(), Timeframe::M5, contiguous(Timeframe::M5, T0, 3));
    assert!(handle.await.is_ok());
}
