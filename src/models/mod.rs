//! Market data models.
//!
//! [`Candle`] is the in-memory OHLCV bar shared by every component;
//! [`kline`] and [`exchange`] hold the Binance wire formats it is built
//! from.

pub mod candle;
pub mod exchange;
pub mod kline;

pub use candle::{Candle, KlineTick};

use serde::{Deserialize, Deserializer};

/// Deserializes a JSON string holding a decimal number into an `f64`.
///
/// Binance quotes every price and quantity as a string to preserve
/// precision on the wire.
pub(crate) fn f64_from_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<f64>().map_err(serde::de::Error::custom)
}
