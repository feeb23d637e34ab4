//! Persisted candle cache.
//!
//! Derived-timeframe series are mirrored into an external ordered list
//! store so a restart can rebuild them without refetching from the
//! exchange. Each list is keyed `{broker}_{symbol}_{timeframe}` and holds
//! one `start_open_high_low_close_volume` record per candle, newest at the
//! front.
//!
//! - [`CandleStore`] - the list store abstraction
//! - [`MemoryStore`] / [`RedisStore`] - its implementations
//! - [`sync`] - incremental mirroring of closed candles

mod memory;
mod redis_store;
pub mod sync;

use async_trait::async_trait;
use tracing::error;

use crate::models::Candle;
use crate::timeframe::Timeframe;
use crate::{CandlekeepError, Result};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sync::CacheSync;

/// An ordered list of opaque string records per key.
///
/// Index 0 is the front. Implementations must be safe to share between
/// tasks.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Number of records under `key`; zero if the key does not exist.
    async fn size(&self, key: &str) -> Result<usize>;

    /// The front record, if any.
    async fn front(&self, key: &str) -> Result<Option<String>>;

    /// Pushes each item onto the front in order, so the last item ends up first.
    async fn push_front(&self, key: &str, items: &[String]) -> Result<()>;

    /// Appends each item to the back in order.
    async fn push_back(&self, key: &str, items: &[String]) -> Result<()>;

    /// Removes and returns the back record.
    async fn pop_back(&self, key: &str) -> Result<Option<String>>;

    /// Every record, front first.
    async fn get_all(&self, key: &str) -> Result<Vec<String>>;

    /// Deletes the list.
    async fn clear(&self, key: &str) -> Result<()>;
}

/// Builds the store key for one series.
pub fn cache_key(broker: &str, symbol: &str, timeframe: Timeframe) -> String {
    format!("{broker}_{symbol}_{timeframe}")
}

/// Serializes a candle as `start_open_high_low_close_volume`.
///
/// Floats use Rust's shortest round-trip representation, so decoding
/// yields the exact same values.
pub fn encode_record(candle: &Candle) -> String {
    format!(
        "{}_{}_{}_{}_{}_{}",
        candle.start_time, candle.open, candle.high, candle.low, candle.close, candle.volume
    )
}

/// Parses a record produced by [`encode_record`].
///
/// # Errors
///
/// Returns [`CandlekeepError::MalformedRecord`] if the record does not
/// have exactly six fields or a field is not a number.
pub fn decode_record(record: &str) -> Result<Candle> {
    let malformed = || CandlekeepError::MalformedRecord(record.to_string());

    let fields: Vec<&str> = record.split('_').collect();
    let [start, open, high, low, close, volume] = fields.as_slice() else {
        return Err(malformed());
    };

    let price = |field: &str| field.parse::<f64>().map_err(|_| malformed());
    Ok(Candle::new(
        start.parse::<i64>().map_err(|_| malformed())?,
        price(*open)?,
        price(*high)?,
        price(*low)?,
        price(*close)?,
        price(*volume)?,
    ))
}

/// Decodes front-first records until the first malformed one.
///
/// Everything before a bad record is kept; the bad record and everything
/// after it are dropped as if the list were truncated there.
pub fn decode_records(key: &str, records: &[String]) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match decode_record(record) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                error!(key, index, kept = candles.len(), "Stopping at bad cache record: {e}");
                break;
            }
        }
    }
    candles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(
            cache_key("binance", "BTCUSDT", Timeframe::H4),
            "binance_BTCUSDT_4h"
        );
    }

    #[test]
    fn record_round_trip_is_exact() {
        let candle = Candle::new(1_699_920_000_000, 37_123.45, 37_200.1, 0.000_012_3, 1e-8, 1_234.567_891);
        let record = encode_record(&candle);
        assert_eq!(decode_record(&record).unwrap(), candle);
    }

    #[test]
    fn record_layout() {
        let candle = Candle::new(60_000, 1.5, 2.0, 1.0, 1.25, 10.0);
        assert_eq!(encode_record(&candle), "60000_1.5_2_1_1.25_10");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(decode_record("60000_1_2_1_1").is_err());
        assert!(decode_record("60000_1_2_1_1_5_7").is_err());
        assert!(decode_record("").is_err());
    }

    #[test]
    fn rejects_non_numeric_fields() {
        assert!(decode_record("abc_1_2_1_1_5").is_err());
        assert!(decode_record("60000_1_x_1_1_5").is_err());
    }

    #[test]
    fn decode_records_stops_at_first_bad_record() {
        let records = vec![
            "180000_3_3_3_3_1".to_string(),
            "120000_2_2_2_2_1".to_string(),
            "garbage".to_string(),
            "0_1_1_1_1_1".to_string(),
        ];
        let candles = decode_records("k", &records);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].start_time, 120_000);
    }
}
