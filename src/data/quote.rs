use std::collections::HashSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Event name carried by every periodic push.
pub const STOCK_DATA_EVENT: &str = "stockData";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

impl Quote {
    /// Builds a quote from a price expressed in cents, so the value always has two decimals.
    pub fn from_cents(symbol: impl Into<String>, cents: i64) -> Self {
        Self {
            symbol: symbol.into(),
            price: Decimal::new(cents, 2),
        }
    }
}

/// Quotes produced by one source invocation, in source order.
pub type Batch = Vec<Quote>;

// Query string shared by `GET /stocks` and the WebSocket handshake
#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    pub symbol: Option<String>,
}

impl StockQuery {
    pub fn from_query_string(query: Option<&str>) -> Self {
        query
            .and_then(|raw| serde_urlencoded::from_str(raw).ok())
            .unwrap_or_default()
    }

    pub fn filter(&self) -> SymbolFilter {
        SymbolFilter::parse(self.symbol.as_deref())
    }
}

/// Case-insensitive set of requested symbols. Empty means every symbol passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolFilter {
    symbols: HashSet<String>,
}

impl SymbolFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        let symbols = raw
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { symbols }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn matches(&self, symbol: &str) -> bool {
        self.symbols.is_empty() || self.symbols.contains(&symbol.to_ascii_uppercase())
    }

    pub fn apply(&self, batch: Batch) -> Batch {
        if self.is_empty() {
            return batch;
        }
        batch.into_iter().filter(|q| self.matches(&q.symbol)).collect()
    }
}

// Push envelope: {"event":"stockData","data":[...],"timestamp":"..."}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockEvent {
    pub event: String,
    pub data: Batch,
    pub timestamp: String,
}

impl StockEvent {
    pub fn stock_data(data: Batch) -> Self {
        Self {
            event: STOCK_DATA_EVENT.to_string(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Batch {
        vec![
            Quote::from_cents("AAPL", 10123),
            Quote::from_cents("GOOG", 104550),
            Quote::from_cents("MSFT", 16000),
        ]
    }

    #[test]
    fn test_quote_price_serializes_as_two_decimal_string() {
        let json = serde_json::to_string(&Quote::from_cents("MSFT", 16000)).unwrap();
        assert_eq!(json, r#"{"symbol":"MSFT","price":"160.00"}"#);
    }

    #[test]
    fn test_symbol_filter_parsing() {
        let filter = SymbolFilter::parse(Some(" aapl, MSFT ,,"));
        assert!(filter.matches("AAPL"));
        assert!(filter.matches("msft"));
        assert!(!filter.matches("GOOG"));

        assert!(SymbolFilter::parse(None).is_empty());
        assert!(SymbolFilter::parse(Some("  ")).is_empty());
    }

    #[test]
    fn test_symbol_filter_preserves_order() {
        let filtered = SymbolFilter::parse(Some("MSFT,AAPL")).apply(batch());
        let symbols: Vec<_> = filtered.iter().map(|q| q.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        assert_eq!(SymbolFilter::default().apply(batch()), batch());
    }

    #[test]
    fn test_stock_query_from_query_string() {
        let query = StockQuery::from_query_string(Some("symbol=AAPL%2CGOOG"));
        assert_eq!(query.symbol.as_deref(), Some("AAPL,GOOG"));
        assert!(StockQuery::from_query_string(None).symbol.is_none());
        assert!(StockQuery::from_query_string(Some("other=1")).symbol.is_none());
    }

    #[test]
    fn test_stock_event_to_json() {
        let json = StockEvent::stock_data(batch()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "stockData");
        assert_eq!(value["data"][0]["symbol"], "AAPL");
        assert_eq!(value["data"][0]["price"], "101.23");
        assert!(value["timestamp"].is_string());
    }
}
