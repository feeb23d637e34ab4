//! OHLCV candle models.

use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

/// A single OHLCV bar. `start_time` is bucket-aligned epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub start_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    #[must_use]
    pub fn new(start_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            start_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// One kline update from the stream, normalised from the wire format.
///
/// The OHLCV values are cumulative for the kline's own bucket: every
/// update for the same `start_time` supersedes the previous one, and the
/// update with `is_final` set carries the bucket's definitive values.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineTick {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_final: bool,
}

impl KlineTick {
    /// The tick's values as a [`Candle`].
    #[must_use]
    pub fn candle(&self) -> Candle {
        Candle::new(
            self.start_time,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}
