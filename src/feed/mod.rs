//! Async WebSocket client for the exchange kline stream.
//!
//! This module is organized by concern:
//! - [`handler`] - Incoming frame parsing
//! - [`connection`] - Connection lifecycle, reconnects and the staleness watchdog

mod connection;
mod handler;

use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;

use crate::Result;
use crate::timeframe::Timeframe;

pub use connection::{DEFAULT_STALE_AFTER, FeedManager};
pub use handler::parse_frame;

/// Default combined-stream endpoint.
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://stream.binance.com:9443/stream";

/// An open stream connection.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the combined-stream URL subscribing to `timeframe` klines of every symbol.
pub fn stream_url(base_url: &str, symbols: &[String], timeframe: Timeframe) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|symbol| format!("{}@kline_{}", symbol.to_lowercase(), timeframe))
        .collect();
    format!("{base_url}?streams={}", streams.join("/"))
}

/// Establishes a WebSocket connection to the given URL.
///
/// The combined stream is subscribed through the URL, so nothing is ever
/// sent; pings are answered by the library while reading.
///
/// # Errors
///
/// Returns a [`CandlekeepError`](crate::CandlekeepError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<WsStream> {
    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream)
}
