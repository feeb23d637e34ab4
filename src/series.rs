//! Rolling per-(symbol, timeframe) candle window.
//!
//! A [`CandleSeries`] keeps its candles newest first. The head candle is
//! still forming until a final update closes it; everything behind it is
//! immutable. Finer candles or stream ticks are folded in with
//! [`CandleSeries::merge`], which reports bucket closures to the caller.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::warn;

use crate::models::Candle;
use crate::timeframe::Timeframe;

/// Number of candles retained per series when not configured otherwise.
pub const DEFAULT_MAX_CANDLES: usize = 1000;

/// Reported by [`CandleSeries::merge`] when an update completes the head candle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Start time of the candle that closed.
    pub start_time: i64,
}

/// Immutable copy of a series as parallel newest-first arrays, the shape
/// the worker engine consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub start_time: Vec<i64>,
}

impl SeriesSnapshot {
    /// Builds a snapshot from newest-first candles.
    #[must_use]
    pub fn from_candles(symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            open: candles.iter().map(|c| c.open).collect(),
            high: candles.iter().map(|c| c.high).collect(),
            low: candles.iter().map(|c| c.low).collect(),
            close: candles.iter().map(|c| c.close).collect(),
            volume: candles.iter().map(|c| c.volume).collect(),
            start_time: candles.iter().map(|c| c.start_time).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.start_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start_time.is_empty()
    }
}

/// Newest-first candles shared between a series and its closure snapshots.
pub type SharedCandles = Arc<VecDeque<Candle>>;

/// Newest-first candle window for one symbol and timeframe, bounded to
/// `max_len` entries.
///
/// The window is copy-on-write: [`shared`](Self::shared) hands out the
/// current candles in O(1), and the next merge copies them only if that
/// handle is still alive.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    symbol: String,
    timeframe: Timeframe,
    max_len: usize,
    candles: SharedCandles,
}

impl CandleSeries {
    /// Creates an empty series. Merges are ignored until it is seeded.
    #[must_use]
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, max_len: usize) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            max_len,
            candles: Arc::new(VecDeque::with_capacity(max_len.min(DEFAULT_MAX_CANDLES) + 1)),
        }
    }

    /// Creates a series from newest-first candles, dropping any beyond `max_len`.
    #[must_use]
    pub fn from_candles(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        max_len: usize,
        candles: Vec<Candle>,
    ) -> Self {
        let mut series = Self {
            symbol: symbol.into(),
            timeframe,
            max_len,
            candles: Arc::new(candles.into()),
        };
        series.evict_excess();
        series
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// The newest (possibly still forming) candle.
    pub fn head(&self) -> Option<&Candle> {
        self.candles.front()
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Candle> + ExactSizeIterator {
        self.candles.iter()
    }

    /// Shares the current candles without copying them.
    pub fn shared(&self) -> SharedCandles {
        Arc::clone(&self.candles)
    }

    /// Copies the candles out, newest first.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        let (front, back) = self.candles.as_slices();
        if back.is_empty() {
            SeriesSnapshot::from_candles(&self.symbol, self.timeframe, front)
        } else {
            SeriesSnapshot::from_candles(&self.symbol, self.timeframe, &self.to_vec())
        }
    }

    /// Folds an update of a `source` candle into this series.
    ///
    /// `candle.start_time` is the source candle's start; it is bucketed to
    /// this series' timeframe. When `source` is this series' own timeframe
    /// the update carries the whole bucket and its volume replaces the
    /// head's; for a finer source, volume is only accumulated from final
    /// updates so partial updates are not double counted.
    ///
    /// Returns a [`Closure`] when a final update ends exactly on this
    /// timeframe's bucket boundary and `suppress_close` is `false`. A finer
    /// update that opens a new bucket never closes it: the bucket has
    /// only seen part of its source candles.
    pub fn merge(
        &mut self,
        candle: &Candle,
        source: Timeframe,
        is_final: bool,
        suppress_close: bool,
    ) -> Option<Closure> {
        if !self.timeframe.derives_from(source) {
            return None;
        }

        let bucket = self.timeframe.bucket_start(candle.start_time);
        let whole_bucket = source == self.timeframe;
        let candles = Arc::make_mut(&mut self.candles);
        let head = candles.front_mut()?;

        // Only an update inside the head's bucket, or a single final tick
        // carrying a whole bucket, can complete a candle.
        let completes_bucket = match bucket.cmp(&head.start_time) {
            Ordering::Equal => {
                head.high = head.high.max(candle.high);
                head.low = head.low.min(candle.low);
                head.close = candle.close;
                if whole_bucket {
                    head.volume = candle.volume;
                } else if is_final {
                    head.volume += candle.volume;
                }
                true
            }
            Ordering::Greater => {
                let volume = if is_final || whole_bucket {
                    candle.volume
                } else {
                    0.0
                };
                candles.push_front(Candle::new(
                    bucket,
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    volume,
                ));
                self.evict_excess();
                whole_bucket
            }
            Ordering::Less => {
                warn!(
                    symbol = %self.symbol,
                    timeframe = %self.timeframe,
                    source = %source,
                    bucket,
                    head = head.start_time,
                    "Discarding out-of-order update"
                );
                return None;
            }
        };

        let closes = completes_bucket
            && is_final
            && self
                .timeframe
                .is_bucket_close(candle.start_time.div_euclid(1_000), source);

        (closes && !suppress_close).then(|| Closure {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            start_time: bucket,
        })
    }

    /// Drops the oldest candles until at most `max_len` remain.
    pub fn evict_excess(&mut self) {
        if self.candles.len() > self.max_len {
            Arc::make_mut(&mut self.candles).truncate(self.max_len);
        }
    }

    /// Returns `true` if every adjacent pair is exactly one timeframe apart.
    pub fn validate_contiguity(&self) -> bool {
        let stride = self.timeframe.duration_millis();
        self.candles
            .iter()
            .zip(self.candles.iter().skip(1))
            .all(|(newer, older)| newer.start_time - older.start_time == stride)
    }
}
