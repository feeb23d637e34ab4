//! Crate-level error types.
//!
//! [`CandlekeepError`] unifies every error source (configuration,
//! WebSocket, HTTP, cache store, JSON) behind a single enum so callers can
//! match on the variant they care about while still using the `?` operator
//! for easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CandlekeepError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum CandlekeepError {
    /// An environment variable held a value that could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    /// A timeframe label outside the supported set was given to a strict parser.
    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A REST request to the exchange failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The exchange answered with something other than the expected payload.
    #[error("exchange api error: {0}")]
    Api(String),

    /// The persisted candle store rejected an operation.
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// A persisted candle record did not have the `start_open_high_low_close_volume` shape.
    #[error("malformed cache record: {0}")]
    MalformedRecord(String),

    /// An incoming stream frame could not be interpreted.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The worker engine refused or failed to take a closed series.
    #[error("consumer error: {0}")]
    Consumer(String),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
