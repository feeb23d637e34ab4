//! Binance `/api/v3/exchangeInfo` models.

use serde::Deserialize;

/// Subset of the exchange info response used to enumerate symbols.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

impl ExchangeInfo {
    /// Names of the trading symbols quoted in `quote_asset`.
    pub fn trading_symbols(self, quote_asset: &str) -> Vec<String> {
        self.symbols
            .into_iter()
            .filter(|s| s.is_trading() && s.quote_asset.as_deref() == Some(quote_asset))
            .map(|s| s.symbol)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "quoteAsset", default)]
    pub quote_asset: Option<String>,
}

impl SymbolInfo {
    /// Returns `true` if the symbol is open for trading.
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_on_declared_quote_asset() {
        let info: ExchangeInfo = serde_json::from_str(
            r#"{"symbols":[
                {"symbol":"BTCUSDT","status":"TRADING","quoteAsset":"USDT"},
                {"symbol":"FOOUSDT","status":"TRADING","quoteAsset":"SDT"},
                {"symbol":"LUNAUSDT","status":"BREAK","quoteAsset":"USDT"},
                {"symbol":"NOQUOTE","status":"TRADING"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(info.trading_symbols("USDT"), vec!["BTCUSDT".to_string()]);
    }
}
