//! Binance kline wire formats, streamed and REST.

use serde::Deserialize;
use serde::de::IgnoredAny;

use super::{Candle, KlineTick, f64_from_str};
use crate::timeframe::Timeframe;

/// Envelope used by the combined-stream endpoint (`/stream?streams=...`).
#[derive(Debug, Clone, Deserialize)]
pub struct StreamFrame<T> {
    pub stream: String,
    pub data: T,
}

/// A `kline` event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlineData,
}

/// The kline body of a [`KlineEvent`].
#[derive(Debug, Clone, Deserialize)]
pub struct KlineData {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o", deserialize_with = "f64_from_str")]
    pub open: f64,
    #[serde(rename = "c", deserialize_with = "f64_from_str")]
    pub close: f64,
    #[serde(rename = "h", deserialize_with = "f64_from_str")]
    pub high: f64,
    #[serde(rename = "l", deserialize_with = "f64_from_str")]
    pub low: f64,
    #[serde(rename = "v", deserialize_with = "f64_from_str")]
    pub volume: f64,
    /// Number of trades in the bucket so far.
    #[serde(rename = "n")]
    pub trades: u64,
    /// `true` once the bucket has ended and the values are definitive.
    #[serde(rename = "x")]
    pub is_final: bool,
}

impl KlineEvent {
    /// Normalises the event into a [`KlineTick`].
    ///
    /// The interval label is resolved leniently, so an unexpected label is
    /// handled as one minute.
    #[must_use]
    pub fn into_tick(self) -> KlineTick {
        KlineTick {
            symbol: self.symbol,
            timeframe: Timeframe::from_label(&self.kline.interval),
            start_time: self.kline.start_time,
            open: self.kline.open,
            high: self.kline.high,
            low: self.kline.low,
            close: self.kline.close,
            volume: self.kline.volume,
            is_final: self.kline.is_final,
        }
    }
}

/// One row of the `/api/v3/klines` response.
///
/// Binance returns each kline as a 12-element JSON array; the trailing
/// fields are not used here.
#[derive(Debug, Clone, Deserialize)]
pub struct RestKline(
    pub i64,
    #[serde(deserialize_with = "f64_from_str")] pub f64,
    #[serde(deserialize_with = "f64_from_str")] pub f64,
    #[serde(deserialize_with = "f64_from_str")] pub f64,
    #[serde(deserialize_with = "f64_from_str")] pub f64,
    #[serde(deserialize_with = "f64_from_str")] pub f64,
    pub i64,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
);

impl From<RestKline> for Candle {
    fn from(row: RestKline) -> Self {
        Candle::new(row.0, row.1, row.2, row.3, row.4, row.5)
    }
}
