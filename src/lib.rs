//! Multi-timeframe OHLCV candle aggregation.
//!
//! Consumes the exchange's base-timeframe kline stream, folds every tick
//! into each coarser tracked series, reconciles series from cache and
//! REST on cold start, mirrors closed candles into Redis, and hands each
//! closed series to a worker engine.

pub mod cache;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod feed;
pub mod models;
pub mod reconcile;
pub mod registry;
pub mod series;
pub mod timeframe;

pub use error::{CandlekeepError, Result};
