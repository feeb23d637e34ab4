//! Exchange REST access for historical candles and the symbol universe.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::models::Candle;
use crate::models::exchange::ExchangeInfo;
use crate::models::kline::RestKline;
use crate::timeframe::Timeframe;
use crate::{CandlekeepError, Result};

/// Default public REST endpoint.
pub const DEFAULT_REST_URL: &str = "https://api.binance.com";

/// Binance caps `/api/v3/klines` at this many rows per request.
const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Source of historical candles and tradable symbols.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Fetches up to `limit` of the most recent candles, newest first.
    ///
    /// The newest candle is usually still forming.
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>>;

    /// Lists every symbol that should be tracked.
    async fn list_symbols(&self) -> Result<Vec<String>>;
}

/// [`MarketDataClient`] for the Binance spot REST API.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    quote_asset: String,
}

impl BinanceClient {
    /// Creates a client for `base_url` that lists symbols quoted in `quote_asset`.
    ///
    /// # Errors
    ///
    /// Returns [`CandlekeepError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, quote_asset: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            quote_asset: quote_asset.into(),
        })
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        end_time: Option<i64>,
    ) -> Result<Vec<RestKline>> {
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", timeframe.label().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(end_time) = end_time {
            query.push(("endTime", end_time.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/api/v3/klines", self.base_url))
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketDataClient for BinanceClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let mut by_start: BTreeMap<i64, Candle> = BTreeMap::new();
        let mut end_time = None;

        while by_start.len() < limit {
            let want = (limit - by_start.len()).min(MAX_KLINES_PER_REQUEST);
            let page = self.fetch_page(symbol, timeframe, want, end_time).await?;
            let Some(oldest) = page.first().map(|row| row.0) else {
                break;
            };

            let before = by_start.len();
            for row in page {
                let candle = Candle::from(row);
                by_start.entry(candle.start_time).or_insert(candle);
            }
            if by_start.len() == before {
                break;
            }
            end_time = Some(oldest - 1);
        }

        debug!(symbol, %timeframe, count = by_start.len(), "Fetched candles");
        Ok(by_start.into_values().rev().take(limit).collect())
    }

    async fn list_symbols(&self) -> Result<Vec<String>> {
        let info: ExchangeInfo = self
            .http
            .get(format!("{}/api/v3/exchangeInfo", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let symbols = info.trading_symbols(&self.quote_asset);

        if symbols.is_empty() {
            return Err(CandlekeepError::Api(format!(
                "no trading symbols quoted in {}",
                self.quote_asset
            )));
        }

        info!(count = symbols.len(), quote = self.quote_asset, "Listed symbols");
        Ok(symbols)
    }
}
