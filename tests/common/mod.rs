//! Shared test utilities and fakes.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use candlekeep::cache::{CacheSync, CandleStore, MemoryStore};
use candlekeep::client::MarketDataClient;
use candlekeep::dispatch::{ChannelConsumer, DispatchGate};
use candlekeep::engine::AggregationEngine;
use candlekeep::models::{Candle, KlineTick};
use candlekeep::registry::Registry;
use candlekeep::series::SeriesSnapshot;
use candlekeep::timeframe::Timeframe;
use candlekeep::{CandlekeepError, Result};

/// Midnight UTC, 2023-11-14, in epoch milliseconds.
pub const T0: i64 = 1_699_920_000_000;

/// One minute in milliseconds.
pub const MIN: i64 = 60_000;

pub const BROKER: &str = "binance";

/// A flat candle whose prices are all `price`.
pub fn flat(start_time: i64, price: f64, volume: f64) -> Candle {
    Candle::new(start_time, price, price, price, price, volume)
}

/// `count` contiguous flat candles of `timeframe`, the oldest starting at
/// `oldest`, returned newest first.
pub fn contiguous(timeframe: Timeframe, oldest: i64, count: usize) -> Vec<Candle> {
    (0..count as i64)
        .rev()
        .map(|i| flat(oldest + i * timeframe.duration_millis(), 100.0 + i as f64, 1.0))
        .collect()
}

/// A stream tick for `symbol` on `timeframe`.
pub fn tick(symbol: &str, timeframe: Timeframe, candle: Candle, is_final: bool) -> KlineTick {
    KlineTick {
        symbol: symbol.to_string(),
        timeframe,
        start_time: candle.start_time,
        open: candle.open,
        high: candle.high,
        low: candle.low,
        close: candle.close,
        volume: candle.volume,
        is_final,
    }
}

/// Canned exchange responses keyed by symbol and timeframe.
///
/// Pairs without a canned response, or listed as failing, return an
/// [`CandlekeepError::Api`] error.
#[derive(Default)]
pub struct FakeClient {
    responses: Mutex<HashMap<(String, Timeframe), Vec<Candle>>>,
    failing: Mutex<HashSet<(String, Timeframe)>>,
    fetches: AtomicUsize,
    requested: Mutex<Vec<(String, Timeframe)>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the newest-first candles returned for one pair.
    pub fn respond(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.responses
            .lock()
            .unwrap()
            .insert((symbol.to_string(), timeframe), candles);
    }

    pub fn fail(&self, symbol: &str, timeframe: Timeframe) {
        self.failing
            .lock()
            .unwrap()
            .insert((symbol.to_string(), timeframe));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn requested(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.requested
            .lock()
            .unwrap()
            .contains(&(symbol.to_string(), timeframe))
    }
}

#[async_trait]
impl MarketDataClient for FakeClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = (symbol.to_string(), timeframe);
        self.requested.lock().unwrap().push(key.clone());

        if self.failing.lock().unwrap().contains(&key) {
            return Err(CandlekeepError::Api(format!("{symbol} {timeframe} unavailable")));
        }
        self.responses
            .lock()
            .unwrap()
            .get(&key)
            .map(|candles| candles.iter().take(limit).copied().collect())
            .ok_or_else(|| CandlekeepError::Api(format!("no canned response for {symbol} {timeframe}")))
    }

    async fn list_symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self
            .responses
            .lock()
            .unwrap()
            .keys()
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

/// A store whose reads succeed but whose writes always fail.
#[derive(Default)]
pub struct ReadOnlyStore {
    inner: MemoryStore,
}

impl ReadOnlyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn refuse() -> CandlekeepError {
        CandlekeepError::Api("store is read-only".to_string())
    }
}

#[async_trait]
impl CandleStore for ReadOnlyStore {
    async fn size(&self, key: &str) -> Result<usize> {
        self.inner.size(key).await
    }

    async fn front(&self, key: &str) -> Result<Option<String>> {
        self.inner.front(key).await
    }

    async fn push_front(&self, _key: &str, _items: &[String]) -> Result<()> {
        Err(Self::refuse())
    }

    async fn push_back(&self, _key: &str, _items: &[String]) -> Result<()> {
        Err(Self::refuse())
    }

    async fn pop_back(&self, _key: &str) -> Result<Option<String>> {
        Err(Self::refuse())
    }

    async fn get_all(&self, key: &str) -> Result<Vec<String>> {
        self.inner.get_all(key).await
    }

    async fn clear(&self, _key: &str) -> Result<()> {
        Err(Self::refuse())
    }
}

/// A store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl CandleStore for BrokenStore {
    async fn size(&self, _key: &str) -> Result<usize> {
        Err(CandlekeepError::Api("store offline".to_string()))
    }

    async fn front(&self, _key: &str) -> Result<Option<String>> {
        Err(CandlekeepError::Api("store offline".to_string()))
    }

    async fn push_front(&self, _key: &str, _items: &[String]) -> Result<()> {
        Err(CandlekeepError::Api("store offline".to_string()))
    }

    async fn push_back(&self, _key: &str, _items: &[String]) -> Result<()> {
        Err(CandlekeepError::Api("store offline".to_string()))
    }

    async fn pop_back(&self, _key: &str) -> Result<Option<String>> {
        Err(CandlekeepError::Api("store offline".to_string()))
    }

    async fn get_all(&self, _key: &str) -> Result<Vec<String>> {
        Err(CandlekeepError::Api("store offline".to_string()))
    }

    async fn clear(&self, _key: &str) -> Result<()> {
        Err(CandlekeepError::Api("store offline".to_string()))
    }
}

/// Every component wired together over an in-memory store.
pub struct Harness {
    pub registry: Arc<Registry>,
    pub store: Arc<MemoryStore>,
    pub cache_sync: CacheSync,
    pub engine: AggregationEngine,
    pub closed: mpsc::UnboundedReceiver<SeriesSnapshot>,
}

impl Harness {
    pub fn new(symbols: &[&str], timeframes: &[Timeframe], max_candles: usize, min_dispatch_len: usize) -> Self {
        let registry = Arc::new(Registry::new(
            symbols.iter().map(|s| s.to_string()).collect(),
            timeframes.to_vec(),
            max_candles,
        ));
        let store = Arc::new(MemoryStore::new());
        let cache_sync = CacheSync::new(store.clone(), Arc::clone(&registry), BROKER);
        let (consumer, closed) = ChannelConsumer::channel();
        let dispatch = DispatchGate::new(Arc::new(consumer), min_dispatch_len);
        let engine = AggregationEngine::new(Arc::clone(&registry), dispatch, cache_sync.clone());

        Self {
            registry,
            store,
            cache_sync,
            engine,
            closed,
        }
    }

    /// Every closed snapshot received so far.
    pub fn drain_closed(&mut self) -> Vec<SeriesSnapshot> {
        let mut out = Vec::new();
        while let Ok(snapshot) = self.closed.try_recv() {
            out.push(snapshot);
        }
        out
    }
}

/// Lets spawned dispatch and cache tasks run to completion.
///
/// Dispatch goes through the blocking pool, so yielding alone is not
/// enough; a short sleep gives those threads time to finish.
pub async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
