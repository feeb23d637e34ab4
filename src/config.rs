//! Application configuration loaded from environment variables.
//!
//! Every variable is optional; unset or empty values fall back to the
//! defaults below.
//!
//! - `CANDLEKEEP_BROKER` — broker name used in cache keys (`binance`)
//! - `CANDLEKEEP_WEBSOCKET_URL` — combined-stream endpoint
//! - `CANDLEKEEP_REST_URL` — REST endpoint for klines and exchange info
//! - `CANDLEKEEP_REDIS_URL` — cache connection string
//! - `CANDLEKEEP_TIMEFRAMES` — comma-separated labels, finest first
//! - `CANDLEKEEP_SYMBOLS` — comma-separated symbols; listed from the
//!   exchange when absent
//! - `CANDLEKEEP_QUOTE_ASSET` — quote asset used when listing symbols
//! - `CANDLEKEEP_MAX_CANDLES`, `CANDLEKEEP_BATCH_SIZE`,
//!   `CANDLEKEEP_MIN_DISPATCH_LEN`, `CANDLEKEEP_STALE_AFTER_SECS`

use std::str::FromStr;
use std::time::Duration;

use crate::client::DEFAULT_REST_URL;
use crate::dispatch::DEFAULT_MIN_DISPATCH_LEN;
use crate::feed::{DEFAULT_STALE_AFTER, DEFAULT_WEBSOCKET_URL};
use crate::reconcile::DEFAULT_BATCH_SIZE;
use crate::series::DEFAULT_MAX_CANDLES;
use crate::timeframe::Timeframe;
use crate::{CandlekeepError, Result};

const DEFAULT_BROKER: &str = "binance";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";
const DEFAULT_QUOTE_ASSET: &str = "USDT";

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub broker: String,
    pub websocket_url: String,
    pub rest_url: String,
    pub redis_url: String,
    /// Tracked timeframes, finest first.
    pub timeframes: Vec<Timeframe>,
    /// Explicit symbol list; `None` means "list from the exchange".
    pub symbols: Option<Vec<String>>,
    pub quote_asset: String,
    pub max_candles: usize,
    pub batch_size: usize,
    pub min_dispatch_len: usize,
    pub stale_after: Duration,
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`CandlekeepError::Config`] if a numeric variable does not
/// parse or is zero, or if the timeframe list is empty, contains an
/// unknown label, or is not strictly ordered finest first.
pub fn fetch_config() -> Result<AppConfig> {
    let timeframes = match non_empty_var("CANDLEKEEP_TIMEFRAMES") {
        Some(raw) => parse_timeframes(&raw)?,
        None => Timeframe::DEFAULT_SET.to_vec(),
    };

    let symbols = non_empty_var("CANDLEKEEP_SYMBOLS").map(|raw| parse_symbols(&raw));
    if symbols.as_ref().is_some_and(Vec::is_empty) {
        return Err(CandlekeepError::Config(
            "CANDLEKEEP_SYMBOLS contains no symbols".to_string(),
        ));
    }

    Ok(AppConfig {
        broker: var_or("CANDLEKEEP_BROKER", DEFAULT_BROKER),
        websocket_url: var_or("CANDLEKEEP_WEBSOCKET_URL", DEFAULT_WEBSOCKET_URL),
        rest_url: var_or("CANDLEKEEP_REST_URL", DEFAULT_REST_URL),
        redis_url: var_or("CANDLEKEEP_REDIS_URL", DEFAULT_REDIS_URL),
        timeframes,
        symbols,
        quote_asset: var_or("CANDLEKEEP_QUOTE_ASSET", DEFAULT_QUOTE_ASSET),
        max_candles: positive_var("CANDLEKEEP_MAX_CANDLES", DEFAULT_MAX_CANDLES)?,
        batch_size: positive_var("CANDLEKEEP_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
        min_dispatch_len: positive_var("CANDLEKEEP_MIN_DISPATCH_LEN", DEFAULT_MIN_DISPATCH_LEN)?,
        stale_after: Duration::from_secs(positive_var(
            "CANDLEKEEP_STALE_AFTER_SECS",
            DEFAULT_STALE_AFTER.as_secs(),
        )?),
    })
}

/// Parses a comma-separated timeframe list, finest first.
fn parse_timeframes(raw: &str) -> Result<Vec<Timeframe>> {
    let timeframes = raw
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(Timeframe::from_str)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| CandlekeepError::Config(format!("CANDLEKEEP_TIMEFRAMES: {e}")))?;

    if timeframes.is_empty() {
        return Err(CandlekeepError::Config(
            "CANDLEKEEP_TIMEFRAMES contains no timeframes".to_string(),
        ));
    }
    if timeframes.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(CandlekeepError::Config(format!(
            "CANDLEKEEP_TIMEFRAMES must be strictly ordered finest first: {raw}"
        )));
    }

    let base = timeframes[0];
    if let Some(tf) = timeframes.iter().find(|tf| !tf.derives_from(base)) {
        return Err(CandlekeepError::Config(format!(
            "CANDLEKEEP_TIMEFRAMES: {tf} is not a multiple of the base timeframe {base}"
        )));
    }

    Ok(timeframes)
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// Parses a numeric variable that must be greater than zero.
fn positive_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = non_empty_var(name) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| CandlekeepError::Config(format!("{name}={raw}: {e}")))?;
    if value == T::default() {
        return Err(CandlekeepError::Config(format!("{name} must be greater than zero")));
    }
    Ok(value)
}

fn var_or(name: &str, default: &str) -> String {
    non_empty_var(name).unwrap_or_else(|| default.to_string())
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
