//! Cold-start reconciliation of every series.
//!
//! Runs on each (re)connect. The base timeframe is always fetched from
//! the exchange. A derived timeframe is rebuilt from its cached candles,
//! caught up by replaying the finer in-memory series, and checked for
//! contiguity; an empty or unreadable cache or a gap falls back to a
//! full fetch.
//!
//! Symbols are reconciled concurrently in fixed-size batches. After each
//! batch the reconciler pauses in proportion to the number of exchange
//! requests the batch made, so warm caches restart quickly while cold
//! ones stay inside the exchange's rate limits.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheSync, CandleStore, cache_key, decode_records};
use crate::client::MarketDataClient;
use crate::models::Candle;
use crate::registry::Registry;
use crate::series::CandleSeries;
use crate::timeframe::Timeframe;

/// Symbols reconciled concurrently per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Pause added after a batch for each exchange request it made.
pub const DEFAULT_REFETCH_PAUSE: Duration = Duration::from_millis(50);

/// Where a reconciled series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesSource {
    /// Fetched from the exchange as the primary source.
    Network,
    /// Rebuilt from the cache plus finer in-memory series.
    Cache,
    /// Fetched from the exchange after the cached rebuild failed validation.
    Refetch,
}

/// Terminal state of one series after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Ready(SeriesSource),
    /// The exchange fetch failed; the series is left empty until the next
    /// reconnect reconciles it again.
    FailedRefetch,
}

/// Outcome for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolReport {
    pub symbol: String,
    pub states: Vec<(Timeframe, ReconcileState)>,
    /// Number of exchange requests made for this symbol.
    pub network_fetches: usize,
}

impl SymbolReport {
    pub fn state(&self, timeframe: Timeframe) -> Option<ReconcileState> {
        self.states
            .iter()
            .find(|(tf, _)| *tf == timeframe)
            .map(|(_, state)| *state)
    }
}

/// Outcome of a whole reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub symbols: Vec<SymbolReport>,
    /// Symbols whose task panicked.
    pub failed_symbols: usize,
    pub network_fetches: usize,
}

impl ReconcileReport {
    /// Number of series that ended in `state`.
    pub fn count(&self, state: ReconcileState) -> usize {
        self.symbols
            .iter()
            .flat_map(|s| s.states.iter())
            .filter(|(_, s)| *s == state)
            .count()
    }
}

/// Populates every registered series before and during live ingestion.
#[derive(Clone)]
pub struct ColdStartReconciler {
    client: Arc<dyn MarketDataClient>,
    store: Arc<dyn CandleStore>,
    registry: Arc<Registry>,
    cache_sync: CacheSync,
    batch_size: usize,
    refetch_pause: Duration,
}

impl ColdStartReconciler {
    #[must_use]
    pub fn new(
        client: Arc<dyn MarketDataClient>,
        registry: Arc<Registry>,
        cache_sync: CacheSync,
        batch_size: usize,
        refetch_pause: Duration,
    ) -> Self {
        Self {
            client,
            store: Arc::clone(cache_sync.store()),
            registry,
            cache_sync,
            batch_size: batch_size.max(1),
            refetch_pause,
        }
    }

    /// Reconciles every registered symbol.
    ///
    /// A symbol whose task panics is logged and counted without affecting
    /// the rest of its batch.
    pub async fn reconcile_all(&self) -> ReconcileReport {
        let symbols = self.registry.symbols().to_vec();
        let total = symbols.len();
        let mut report = ReconcileReport::default();
        let mut done = 0;

        for batch in symbols.chunks(self.batch_size) {
            let mut tasks = JoinSet::new();
            for symbol in batch {
                let this = self.clone();
                let symbol = symbol.clone();
                tasks.spawn(async move { this.reconcile_symbol(&symbol).await });
            }

            let mut batch_fetches = 0;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(symbol_report) => {
                        batch_fetches += symbol_report.network_fetches;
                        report.symbols.push(symbol_report);
                    }
                    Err(e) => {
                        error!("Reconciliation task panicked: {e}");
                        report.failed_symbols += 1;
                    }
                }
            }

            done += batch.len();
            report.network_fetches += batch_fetches;
            info!(done, total, network_fetches = batch_fetches, "Reconciled batch");

            if done < total && batch_fetches > 0 {
                let pause = self.refetch_pause.saturating_mul(batch_fetches as u32);
                tokio::time::sleep(pause).await;
            }
        }

        report
    }

    /// Reconciles every timeframe of one symbol, finest first.
    ///
    /// Failures never abort the symbol: an unreadable cache falls back to
    /// the exchange and a failed fetch is recorded per series.
    pub async fn reconcile_symbol(&self, symbol: &str) -> SymbolReport {
        let mut report = SymbolReport {
            symbol: symbol.to_string(),
            states: Vec::with_capacity(self.registry.timeframes().len()),
            network_fetches: 0,
        };

        let base = self.registry.base_timeframe();
        for &timeframe in self.registry.timeframes() {
            let state = if timeframe == base {
                report.network_fetches += 1;
                self.fetch_into(symbol, timeframe, SeriesSource::Network).await
            } else {
                self.reconcile_derived(symbol, timeframe, &mut report.network_fetches)
                    .await
            };
            debug!(symbol, %timeframe, ?state, "Reconciled series");
            report.states.push((timeframe, state));
        }

        report
    }

    async fn reconcile_derived(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        network_fetches: &mut usize,
    ) -> ReconcileState {
        let key = cache_key(self.cache_sync.broker(), symbol, timeframe);
        let records = self.store.get_all(&key).await.unwrap_or_else(|e| {
            warn!(key, "Cache unreadable, fetching from the exchange: {e}");
            Vec::new()
        });
        let cached = decode_records(&key, &records);

        if cached.is_empty() {
            *network_fetches += 1;
            let state = self.fetch_into(symbol, timeframe, SeriesSource::Network).await;
            self.reseed_cache(symbol, timeframe, state).await;
            return state;
        }

        let mut series =
            CandleSeries::from_candles(symbol, timeframe, self.registry.max_candles(), cached);
        self.replay_finer(&mut series);
        series.evict_excess();

        if !series.validate_contiguity() {
            warn!(symbol, %timeframe, "Cached series is not contiguous, refetching");
            *network_fetches += 1;
            let state = self.fetch_into(symbol, timeframe, SeriesSource::Refetch).await;
            self.reseed_cache(symbol, timeframe, state).await;
            return state;
        }

        self.registry.install(series);
        ReconcileState::Ready(SeriesSource::Cache)
    }

    /// Catches a cache-loaded series up using the finer in-memory series.
    ///
    /// Finer series are visited from the next-finer timeframe down to the
    /// base. Each contributes its candles from the replay watermark
    /// onwards, oldest first; its newest candle is still forming and is
    /// replayed as a partial update, so the next finer series resumes from
    /// that candle's start to supply the volume it could not.
    fn replay_finer(&self, series: &mut CandleSeries) {
        let timeframe = series.timeframe();
        let Some(head) = series.head() else {
            return;
        };
        // Cached candles are all closed, so replay starts at the next bucket.
        let mut watermark = timeframe.next_bucket_start(head.start_time);

        let finer = self
            .registry
            .timeframes()
            .iter()
            .rev()
            .filter(|tf| **tf < timeframe && timeframe.derives_from(**tf));

        for &source in finer {
            let candles = self.registry.candles(series.symbol(), source);
            let newer: Vec<&Candle> = candles
                .iter()
                .take_while(|c| c.start_time >= watermark)
                .collect();
            let Some(newest) = newer.first() else {
                continue;
            };
            let newest_start = newest.start_time;

            for (index, candle) in newer.iter().enumerate().rev() {
                series.merge(candle, source, index > 0, true);
            }
            debug!(
                symbol = series.symbol(),
                %timeframe,
                %source,
                replayed = newer.len(),
                "Replayed finer candles"
            );
            watermark = newest_start;
        }
    }

    /// Fetches a full series from the exchange and installs it.
    async fn fetch_into(&self, symbol: &str, timeframe: Timeframe, source: SeriesSource) -> ReconcileState {
        match self
            .client
            .fetch_candles(symbol, timeframe, self.registry.max_candles())
            .await
        {
            Ok(candles) => {
                self.registry.replace_series(symbol, timeframe, candles);
                ReconcileState::Ready(source)
            }
            Err(e) => {
                error!(symbol, %timeframe, "Failed to fetch candles: {e}");
                self.registry.replace_series(symbol, timeframe, Vec::new());
                ReconcileState::FailedRefetch
            }
        }
    }

    /// Drops the stale cache list and, if the fetch succeeded, reseeds it
    /// from the freshly fetched series.
    async fn reseed_cache(&self, symbol: &str, timeframe: Timeframe, state: ReconcileState) {
        let reseed = state != ReconcileState::FailedRefetch;
        if let Err(e) = self.cache_sync.reset(symbol, timeframe, reseed).await {
            warn!(symbol, %timeframe, "Failed to reseed cache: {e}");
        }
    }
}
