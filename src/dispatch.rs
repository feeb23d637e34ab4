//! Hand-off of closed series to the worker engine.
//!
//! [`DispatchGate`] runs the injected [`CandleConsumer`] on the blocking
//! pool so a slow evaluation can never stall tick ingestion. Consumer
//! errors and panics stop at this boundary and are only logged.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::series::SeriesSnapshot;
use crate::{CandlekeepError, Result};

/// Minimum series length handed to the worker engine.
pub const DEFAULT_MIN_DISPATCH_LEN: usize = 15;

/// Receives a snapshot every time a candle closes.
///
/// Called from a blocking-pool thread; implementations may take their
/// time but must be shareable across threads.
pub trait CandleConsumer: Send + Sync {
    /// # Errors
    ///
    /// Any error is logged by the gate and otherwise ignored.
    fn on_candle_close(&self, snapshot: &SeriesSnapshot) -> Result<()>;
}

/// Forwards snapshots over an unbounded channel to a consumer living in
/// another task.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: mpsc::UnboundedSender<SeriesSnapshot>,
}

impl ChannelConsumer {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<SeriesSnapshot>) -> Self {
        Self { tx }
    }

    /// Creates a consumer together with the receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SeriesSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CandleConsumer for ChannelConsumer {
    fn on_candle_close(&self, snapshot: &SeriesSnapshot) -> Result<()> {
        self.tx
            .send(snapshot.clone())
            .map_err(|_| CandlekeepError::Consumer("snapshot receiver dropped".to_string()))
    }
}

/// Dispatches closed series to the worker engine without blocking.
#[derive(Clone)]
pub struct DispatchGate {
    consumer: Arc<dyn CandleConsumer>,
    min_len: usize,
}

impl DispatchGate {
    #[must_use]
    pub fn new(consumer: Arc<dyn CandleConsumer>, min_len: usize) -> Self {
        Self { consumer, min_len }
    }

    /// Hands `snapshot` to the consumer on the blocking pool.
    ///
    /// Snapshots shorter than the configured minimum are dropped and
    /// `None` is returned. The returned handle completes once the
    /// consumer has finished; ingestion never waits on it.
    pub fn dispatch(&self, snapshot: SeriesSnapshot) -> Option<JoinHandle<()>> {
        if snapshot.len() < self.min_len {
            debug!(
                symbol = snapshot.symbol,
                timeframe = %snapshot.timeframe,
                len = snapshot.len(),
                "Series too short to dispatch"
            );
            return None;
        }

        let symbol = snapshot.symbol.clone();
        let timeframe = snapshot.timeframe;
        let consumer = Arc::clone(&self.consumer);
        let work = tokio::task::spawn_blocking(move || consumer.on_candle_close(&snapshot));

        Some(tokio::spawn(async move {
            match work.await {
                Ok(Ok(())) => debug!(symbol, %timeframe, "Dispatched closed candle"),
                Ok(Err(e)) => error!(symbol, %timeframe, "Worker rejected closed candle: {e}"),
                Err(e) => error!(symbol, %timeframe, "Worker panicked on closed candle: {e}"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use crate::timeframe::Timeframe;

    struct Panicking;

    impl CandleConsumer for Panicking {
        fn on_candle_close(&self, _snapshot: &SeriesSnapshot) -> Result<()> {
            panic!("strategy blew up");
        }
    }

    fn snapshot(len: usize) -> SeriesSnapshot {
        let candles: Vec<Candle> = (0..len as i64)
            .rev()
            .map(|i| Candle::new(i * 60_000, 1.0, 1.0, 1.0, 1.0, 1.0))
            .collect();
        SeriesSnapshot::from_candles("BTCUSDT", Timeframe::M1, &candles)
    }

    #[tokio::test]
    async fn short_series_are_not_dispatched() {
        let (consumer, mut rx) = ChannelConsumer::channel();
        let gate = DispatchGate::new(Arc::new(consumer), 15);

        assert!(gate.dispatch(snapshot(14)).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_reaches_consumer() {
        let (consumer, mut rx) = ChannelConsumer::channel();
        let gate = DispatchGate::new(Arc::new(consumer), 15);

        gate.dispatch(snapshot(20)).unwrap().await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.len(), 20);
        assert_eq!(received.symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn consumer_panic_is_contained() {
        let gate = DispatchGate::new(Arc::new(Panicking), 1);
        let handle = gate.dispatch(snapshot(3)).unwrap();
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn dropped_receiver_is_logged_not_propagated() {
        let (consumer, rx) = ChannelConsumer::channel();
        drop(rx);
        let gate = DispatchGate::new(Arc::new(consumer), 1);
        assert!(gate.dispatch(snapshot(3)).unwrap().await.is_ok());
    }
}
