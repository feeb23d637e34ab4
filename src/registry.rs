//! Shared map of every tracked candle series.
//!
//! The set of symbols and timeframes is fixed when the [`Registry`] is
//! built. Series are mutated in place behind one registry-wide lock that
//! is only ever held for in-memory work, never across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::models::Candle;
use crate::series::{CandleSeries, SeriesSnapshot};
use crate::timeframe::Timeframe;

/// Every series of one symbol, plus its last observed price.
#[derive(Debug)]
pub struct SymbolSeries {
    series: BTreeMap<Timeframe, CandleSeries>,
    last_price: Option<f64>,
    last_update: Instant,
}

impl SymbolSeries {
    pub fn series(&self, timeframe: Timeframe) -> Option<&CandleSeries> {
        self.series.get(&timeframe)
    }

    pub fn series_mut(&mut self, timeframe: Timeframe) -> Option<&mut CandleSeries> {
        self.series.get_mut(&timeframe)
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    /// Records a fresh price observation.
    pub fn touch(&mut self, price: f64, now: Instant) {
        self.last_price = Some(price);
        self.last_update = now;
    }
}

/// Thread-safe registry of all (symbol, timeframe) series.
#[derive(Debug)]
pub struct Registry {
    timeframes: Vec<Timeframe>,
    max_candles: usize,
    symbols: Vec<String>,
    inner: Mutex<HashMap<String, SymbolSeries>>,
}

impl Registry {
    /// Registers an empty series for every symbol and timeframe.
    ///
    /// `timeframes` must be non-empty and ordered finest first; the first
    /// entry is the base timeframe fed by the stream.
    #[must_use]
    pub fn new(symbols: Vec<String>, timeframes: Vec<Timeframe>, max_candles: usize) -> Self {
        assert!(!timeframes.is_empty(), "registry needs at least one timeframe");

        let now = Instant::now();
        let map = symbols
            .iter()
            .map(|symbol| {
                let series = timeframes
                    .iter()
                    .map(|tf| (*tf, CandleSeries::new(symbol.clone(), *tf, max_candles)))
                    .collect();
                let state = SymbolSeries {
                    series,
                    last_price: None,
                    last_update: now,
                };
                (symbol.clone(), state)
            })
            .collect();

        Self {
            timeframes,
            max_candles,
            symbols,
            inner: Mutex::new(map),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SymbolSeries>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The finest tracked timeframe, fed directly by the stream.
    pub fn base_timeframe(&self) -> Timeframe {
        self.timeframes[0]
    }

    /// Tracked timeframes, finest first.
    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn max_candles(&self) -> usize {
        self.max_candles
    }

    /// Runs `f` with exclusive access to one symbol's series.
    ///
    /// Returns `None` if the symbol is not registered.
    pub fn with_symbol<R>(&self, symbol: &str, f: impl FnOnce(&mut SymbolSeries) -> R) -> Option<R> {
        self.lock().get_mut(symbol).map(f)
    }

    /// Copies one series out, newest first. Unknown pairs yield an empty vector.
    pub fn candles(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        self.with_symbol(symbol, |state| {
            state
                .series(timeframe)
                .map(CandleSeries::to_vec)
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    pub fn snapshot(&self, symbol: &str, timeframe: Timeframe) -> Option<SeriesSnapshot> {
        self.with_symbol(symbol, |state| state.series(timeframe).map(CandleSeries::snapshot))
            .flatten()
    }

    /// Replaces a series wholesale with newest-first `candles`.
    ///
    /// Returns `false` if the pair is not registered.
    pub fn replace_series(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> bool {
        let series = CandleSeries::from_candles(symbol, timeframe, self.max_candles, candles);
        self.install(series)
    }

    /// Installs a fully built series in place of the registered one.
    pub fn install(&self, series: CandleSeries) -> bool {
        let symbol = series.symbol().to_string();
        let timeframe = series.timeframe();
        self.with_symbol(&symbol, |state| {
            match state.series.get_mut(&timeframe) {
                Some(slot) => {
                    *slot = series;
                    true
                }
                None => false,
            }
        })
        .unwrap_or(false)
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.with_symbol(symbol, |state| state.last_price).flatten()
    }

    /// Resets every symbol's update clock, e.g. after a reconnect.
    pub fn touch_all(&self, now: Instant) {
        for state in self.lock().values_mut() {
            state.last_update = now;
        }
    }

    /// Symbols that have not received an update within `threshold` of `now`, sorted.
    pub fn stale_symbols(&self, now: Instant, threshold: Duration) -> Vec<String> {
        let mut stale: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, state)| now.saturating_duration_since(state.last_update) > threshold)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        stale.sort();
        stale
    }
}
