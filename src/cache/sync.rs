//! Incremental mirroring of derived series into the [`CandleStore`].
//!
//! Each sync appends only what the store is missing: an empty list is
//! seeded with every closed candle, otherwise only candles newer than the
//! stored front record are pushed. The list is then trimmed back to the
//! retention bound.
//!
//! Operations on one key are serialized, so a reconnect's reseed and a
//! live closure's sync never interleave on the same list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{CandleStore, cache_key, decode_record, encode_record};
use crate::Result;
use crate::models::Candle;
use crate::registry::Registry;
use crate::timeframe::Timeframe;

/// Mirrors closed non-base candles into the persisted store.
#[derive(Clone)]
pub struct CacheSync {
    store: Arc<dyn CandleStore>,
    registry: Arc<Registry>,
    broker: String,
    key_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl CacheSync {
    #[must_use]
    pub fn new(store: Arc<dyn CandleStore>, registry: Arc<Registry>, broker: impl Into<String>) -> Self {
        Self {
            store,
            registry,
            broker: broker.into(),
            key_locks: Arc::default(),
        }
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    pub fn store(&self) -> &Arc<dyn CandleStore> {
        &self.store
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// Syncs the current in-memory series for `symbol` at `timeframe`.
    ///
    /// The registry lock is held only while the series is copied.
    ///
    /// # Errors
    ///
    /// Returns the store's error if any cache operation fails.
    pub async fn sync(&self, symbol: &str, timeframe: Timeframe) -> Result<usize> {
        if timeframe == self.registry.base_timeframe() {
            return Ok(0);
        }
        let candles = self.registry.candles(symbol, timeframe);
        self.sync_candles(symbol, timeframe, &candles).await
    }

    /// Syncs a newest-first snapshot taken by the caller. Returns the
    /// number of records pushed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if any cache operation fails.
    pub async fn sync_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<usize> {
        if timeframe == self.registry.base_timeframe() || candles.is_empty() {
            return Ok(0);
        }

        let key = cache_key(&self.broker, symbol, timeframe);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;
        self.sync_key(&key, candles).await
    }

    /// Drops the list for `symbol` at `timeframe` and, when `reseed` is
    /// set, rebuilds it from the current in-memory series. Returns the
    /// number of records pushed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if any cache operation fails.
    pub async fn reset(&self, symbol: &str, timeframe: Timeframe, reseed: bool) -> Result<usize> {
        if timeframe == self.registry.base_timeframe() {
            return Ok(0);
        }

        let key = cache_key(&self.broker, symbol, timeframe);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        self.store.clear(&key).await?;
        if !reseed {
            return Ok(0);
        }
        let candles = self.registry.candles(symbol, timeframe);
        if candles.is_empty() {
            return Ok(0);
        }
        self.sync_key(&key, &candles).await
    }

    /// Diffs `candles` against the list under `key`. Callers hold the key lock.
    async fn sync_key(&self, key: &str, candles: &[Candle]) -> Result<usize> {
        let newest_stored = self.newest_stored(key).await?;

        let pushed = match newest_stored {
            None => {
                // The head is excluded: it is re-derived live after a restart.
                let items: Vec<String> = candles.iter().skip(1).map(encode_record).collect();
                self.store.push_back(key, &items).await?;
                items.len()
            }
            Some(last_time) => {
                let items: Vec<String> = candles
                    .iter()
                    .take_while(|c| c.start_time > last_time)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .map(encode_record)
                    .collect();
                self.store.push_front(key, &items).await?;
                items.len()
            }
        };

        let max = self.registry.max_candles();
        while self.store.size(key).await? > max {
            if self.store.pop_back(key).await?.is_none() {
                break;
            }
        }

        if pushed > 0 {
            debug!(key, pushed, "Updated cache");
        }
        Ok(pushed)
    }

    /// Start time of the front record, or `None` if the list is empty.
    ///
    /// A front record that cannot be parsed poisons every future diff, so
    /// the list is dropped and reseeded.
    async fn newest_stored(&self, key: &str) -> Result<Option<i64>> {
        if self.store.size(key).await? == 0 {
            return Ok(None);
        }
        let Some(front) = self.store.front(key).await? else {
            return Ok(None);
        };
        match decode_record(&front) {
            Ok(candle) => Ok(Some(candle.start_time)),
            Err(e) => {
                warn!(key, "Clearing cache list with unreadable front record: {e}");
                self.store.clear(key).await?;
                Ok(None)
            }
        }
    }

    /// Runs [`sync_candles`](Self::sync_candles) on a background task.
    ///
    /// Failures are logged and the cycle is skipped; the next closure's
    /// diff picks up whatever was missed.
    pub fn spawn_sync(&self, symbol: String, timeframe: Timeframe, candles: Vec<Candle>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.sync_candles(&symbol, timeframe, &candles).await {
                error!(symbol, %timeframe, "Failed to update cache: {e}");
            }
        })
    }
}
