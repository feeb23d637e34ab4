//! Cross-timeframe aggregation of stream ticks.
//!
//! Every tick of the base timeframe is folded into the base series and
//! into each coarser series it evenly divides, all under one registry
//! lock. Closures are collected in finest-to-coarsest order and routed to
//! the [`DispatchGate`] and [`CacheSync`] after the lock is released.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::cache::CacheSync;
use crate::dispatch::DispatchGate;
use crate::models::{Candle, KlineTick};
use crate::registry::Registry;
use crate::series::{Closure, SeriesSnapshot, SharedCandles};

/// Folds base ticks into every derived series and routes closures.
pub struct AggregationEngine {
    registry: Arc<Registry>,
    dispatch: DispatchGate,
    cache_sync: CacheSync,
}

impl AggregationEngine {
    #[must_use]
    pub fn new(registry: Arc<Registry>, dispatch: DispatchGate, cache_sync: CacheSync) -> Self {
        Self {
            registry,
            dispatch,
            cache_sync,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Applies one stream tick and returns the closures it caused.
    ///
    /// Each closure is dispatched to the worker engine and, for derived
    /// timeframes, mirrored into the cache, both on background tasks. Must
    /// be called from within a Tokio runtime.
    pub fn on_base_tick(&self, tick: &KlineTick) -> Vec<Closure> {
        let candle = tick.candle();
        let closed = self.merge_all(tick, &candle);

        let base = self.registry.base_timeframe();
        closed
            .into_iter()
            .map(|(closure, shared)| {
                let candles: Vec<Candle> = shared.iter().copied().collect();
                drop(shared);
                let snapshot = SeriesSnapshot::from_candles(&closure.symbol, closure.timeframe, &candles);
                self.dispatch.dispatch(snapshot);
                if closure.timeframe != base {
                    self.cache_sync
                        .spawn_sync(closure.symbol.clone(), closure.timeframe, candles);
                }
                closure
            })
            .collect()
    }

    /// Merges under the registry lock, sharing out each closed series.
    ///
    /// Only the shared handles leave the lock; the candles are copied after
    /// it is released.
    fn merge_all(&self, tick: &KlineTick, candle: &Candle) -> Vec<(Closure, SharedCandles)> {
        let timeframes = self.registry.timeframes();
        let merged = self.registry.with_symbol(&tick.symbol, |state| {
            state.touch(tick.close, Instant::now());

            let mut closed = Vec::new();
            for tf in timeframes.iter().filter(|tf| tf.derives_from(tick.timeframe)) {
                let Some(series) = state.series_mut(*tf) else {
                    continue;
                };
                if let Some(closure) = series.merge(candle, tick.timeframe, tick.is_final, false) {
                    closed.push((closure, series.shared()));
                }
            }
            closed
        });

        merged.unwrap_or_else(|| {
            debug!(symbol = tick.symbol, "Ignoring tick for unregistered symbol");
            Vec::new()
        })
    }
}
