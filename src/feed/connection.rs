//! Stream connection lifecycle management.
//!
//! [`FeedManager`] connects to the kline stream, starts a cold-start
//! reconciliation on every (re)connect, feeds ticks into the
//! [`AggregationEngine`], and reconnects with exponential backoff when the
//! connection drops or a symbol stops receiving updates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tungstenite::Message as WsMessage;

use super::{WsStream, connect, parse_frame};
use crate::engine::AggregationEngine;
use crate::reconcile::{ColdStartReconciler, ReconcileReport, ReconcileState};

/// Initial backoff duration between reconnection attempts.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum backoff duration between reconnection attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Longest interval between two staleness checks.
const MAX_WATCHDOG_PERIOD: Duration = Duration::from_secs(60);

/// Default window after which a silent symbol counts as stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Why the reader loop exited.
#[derive(Debug)]
enum DisconnectReason {
    /// The connection was lost or errored.
    ConnectionError,
    /// At least one symbol stopped receiving updates.
    Stale,
}

/// Keeps the kline stream connected and the engine fed.
pub struct FeedManager {
    url: String,
    engine: Arc<AggregationEngine>,
    reconciler: ColdStartReconciler,
    stale_after: Duration,
}

impl FeedManager {
    /// Creates a feed manager for the fully built stream `url`.
    #[must_use]
    pub fn new(
        url: String,
        engine: Arc<AggregationEngine>,
        reconciler: ColdStartReconciler,
        stale_after: Duration,
    ) -> Self {
        Self {
            url,
            engine,
            reconciler,
            stale_after,
        }
    }

    /// Runs the feed indefinitely.
    ///
    /// Each successful connection starts a reconciliation task whose
    /// outcome is observed and logged by the reader loop; ticks arriving
    /// before it finishes are merged into whatever series are already
    /// populated.
    pub async fn run(self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            info!(url = %self.url, "Connecting to kline stream");
            let stream = match connect(&self.url).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Connection failed: {e}");
                    info!(backoff_secs = backoff.as_secs(), "Backing off before retry");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            // Reset backoff on successful connection
            backoff = INITIAL_BACKOFF;
            self.engine.registry().touch_all(Instant::now());

            let reconciler = self.reconciler.clone();
            let mut reconciliation = tokio::spawn(async move { reconciler.reconcile_all().await });

            let reason = self.read_loop(stream, &mut reconciliation).await;
            // A reconnect starts a fresh reconciliation; never let two overlap.
            reconciliation.abort();

            match reason {
                DisconnectReason::Stale => {
                    warn!("Stale symbols detected, reconnecting");
                }
                DisconnectReason::ConnectionError => {
                    info!(
                        backoff_secs = backoff.as_secs(),
                        "Connection lost, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Reads frames until disconnection or staleness.
    async fn read_loop(
        &self,
        mut stream: WsStream,
        reconciliation: &mut JoinHandle<ReconcileReport>,
    ) -> DisconnectReason {
        let period = self
            .stale_after
            .min(MAX_WATCHDOG_PERIOD)
            .max(Duration::from_secs(1));
        let mut watchdog =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut reconciled = false;

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => self.handle_text(text.as_str()),
                        Some(Ok(WsMessage::Close(frame))) => {
                            warn!(?frame, "Stream closed by server");
                            return DisconnectReason::ConnectionError;
                        }
                        Some(Ok(_)) => {} // Binary/Ping/Pong frames
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return DisconnectReason::ConnectionError;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return DisconnectReason::ConnectionError;
                        }
                    }
                }

                joined = &mut *reconciliation, if !reconciled => {
                    reconciled = true;
                    match joined {
                        Ok(report) => info!(
                            symbols = report.symbols.len(),
                            failed_symbols = report.failed_symbols,
                            failed_refetch = report.count(ReconcileState::FailedRefetch),
                            network_fetches = report.network_fetches,
                            "Cold start reconciliation finished"
                        ),
                        Err(e) => error!("Reconciliation task failed: {e}"),
                    }
                }

                _ = watchdog.tick() => {
                    let stale = self
                        .engine
                        .registry()
                        .stale_symbols(Instant::now(), self.stale_after);
                    if !stale.is_empty() {
                        for symbol in &stale {
                            error!(symbol, stale_after_secs = self.stale_after.as_secs(), "Symbol not updated");
                        }
                        return DisconnectReason::Stale;
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match parse_frame(text) {
            Ok(Some(tick)) => {
                for closure in self.engine.on_base_tick(&tick) {
                    debug!(
                        symbol = closure.symbol,
                        timeframe = %closure.timeframe,
                        start_time = closure.start_time,
                        "Candle closed"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Dropping frame: {e}"),
        }
    }
}
