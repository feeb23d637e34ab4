//! Timeframe arithmetic.
//!
//! Every supported candle granularity is a variant of [`Timeframe`]; its
//! label and duration come from one static table indexed by the variant.
//! Timestamps are milliseconds unless a parameter name says otherwise.

use std::fmt;
use std::str::FromStr;

use crate::CandlekeepError;

/// A candle granularity, ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
}

struct TimeframeInfo {
    label: &'static str,
    seconds: i64,
}

/// Indexed by `Timeframe as usize`; order must match the enum.
const INFO: [TimeframeInfo; 12] = [
    TimeframeInfo { label: "1m", seconds: 60 },
    TimeframeInfo { label: "3m", seconds: 180 },
    TimeframeInfo { label: "5m", seconds: 300 },
    TimeframeInfo { label: "15m", seconds: 900 },
    TimeframeInfo { label: "30m", seconds: 1_800 },
    TimeframeInfo { label: "1h", seconds: 3_600 },
    TimeframeInfo { label: "2h", seconds: 7_200 },
    TimeframeInfo { label: "4h", seconds: 14_400 },
    TimeframeInfo { label: "6h", seconds: 21_600 },
    TimeframeInfo { label: "8h", seconds: 28_800 },
    TimeframeInfo { label: "12h", seconds: 43_200 },
    TimeframeInfo { label: "1d", seconds: 86_400 },
];

impl Timeframe {
    /// Every supported timeframe, finest first.
    pub const ALL: [Timeframe; 12] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H8,
        Timeframe::H12,
        Timeframe::D1,
    ];

    /// The set tracked when no override is configured.
    pub const DEFAULT_SET: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    fn info(self) -> &'static TimeframeInfo {
        &INFO[self as usize]
    }

    /// Returns the exchange label (`"1m"`, `"4h"`, ...).
    pub fn label(self) -> &'static str {
        self.info().label
    }

    /// Lenient label lookup: anything unrecognised is treated as one minute.
    ///
    /// Use [`str::parse`] where an unknown label must be rejected.
    pub fn from_label(label: &str) -> Timeframe {
        label.parse().unwrap_or(Timeframe::M1)
    }

    pub fn duration_seconds(self) -> i64 {
        self.info().seconds
    }

    pub fn duration_millis(self) -> i64 {
        self.info().seconds * 1_000
    }

    /// Floors `timestamp_ms` to the start of its bucket.
    pub fn bucket_start(self, timestamp_ms: i64) -> i64 {
        timestamp_ms - timestamp_ms.rem_euclid(self.duration_millis())
    }

    /// Start of the bucket following the one containing `timestamp_ms`.
    pub fn next_bucket_start(self, timestamp_ms: i64) -> i64 {
        self.bucket_start(timestamp_ms) + self.duration_millis()
    }

    /// Returns `true` if candles of this timeframe can be built from `finer` ones.
    pub fn derives_from(self, finer: Timeframe) -> bool {
        self.duration_seconds() % finer.duration_seconds() == 0
    }

    /// Returns `true` if the `source` candle starting at `tick_epoch_secs`
    /// ends exactly on a boundary of this timeframe, i.e. completing it
    /// also completes the candle of `self` that contains it.
    pub fn is_bucket_close(self, tick_epoch_secs: i64, source: Timeframe) -> bool {
        let next_boundary_secs = tick_epoch_secs + source.duration_seconds();
        next_boundary_secs.rem_euclid(self.duration_seconds()) == 0
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = CandlekeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.label() == s)
            .ok_or_else(|| CandlekeepError::UnknownTimeframe(s.to_string()))
    }
}
