use std::fmt;
use std::str::FromStr;
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Price as it arrived on the wire: the server sends strings, other feeds may send numbers.
/// Anything else lands in `Other` so one bad entry never fails the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Text(String),
    Number(serde_json::Number),
    Other(serde_json::Value),
}

impl Default for RawPrice {
    fn default() -> Self {
        RawPrice::Other(serde_json::Value::Null)
    }
}

impl fmt::Display for RawPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawPrice::Text(text) => write!(f, "{}", text),
            RawPrice::Number(number) => write!(f, "{}", number),
            RawPrice::Other(value) => write!(f, "{}", value),
        }
    }
}

/// A quote as received by the client. The price is only parsed when the chart is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQuote {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub price: RawPrice,
}

impl RawQuote {
    pub fn new(symbol: &str, price: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: RawPrice::Text(price.to_string()),
        }
    }

    pub fn parse_price(&self) -> Result<Decimal, FeedError> {
        let text = self.price.to_string();
        if let RawPrice::Other(_) = self.price {
            return Err(FeedError::MalformedQuote {
                symbol: self.symbol.clone(),
                price: text,
            });
        }
        let trimmed = text.trim();
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| FeedError::MalformedQuote {
                symbol: self.symbol.clone(),
                price: text.clone(),
            })
    }
}

pub type ReceivedBatch = Vec<RawQuote>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub price: Decimal,
}

/// Labels each quote `T1..Tn` by its position in the batch and drops entries
/// whose price does not parse. Later labels keep their original position.
pub fn derive_chart_series(batch: &[RawQuote]) -> Vec<ChartPoint> {
    batch
        .iter()
        .enumerate()
        .filter_map(|(index, quote)| match quote.parse_price() {
            Ok(price) => Some(ChartPoint {
                label: format!("T{}", index + 1),
                price,
            }),
            Err(e) => {
                warn!("Dropping chart point T{}: {}", index + 1, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn test_labels_follow_batch_position() {
        let batch = vec![
            RawQuote::new("MSFT", "160.00"),
            RawQuote::new("AAPL", "101.23"),
            RawQuote::new("GOOG", "1045.50"),
        ];
        let series = derive_chart_series(&batch);

        let labels: Vec<_> = series.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["T1", "T2", "T3"]);
        assert_eq!(series[0].price, dec("160.00"));
    }

    #[test]
    fn test_malformed_price_is_dropped() {
        let batch = vec![
            RawQuote::new("AAPL", "101.23"),
            RawQuote::new("GOOG", "bad"),
            RawQuote::new("MSFT", "160.00"),
        ];

        assert_eq!(
            derive_chart_series(&batch),
            vec![
                ChartPoint { label: "T1".to_string(), price: dec("101.23") },
                ChartPoint { label: "T3".to_string(), price: dec("160.00") },
            ]
        );
    }

    #[test]
    fn test_numeric_prices_are_accepted() {
        let batch: ReceivedBatch = serde_json::from_str(r#"[{"symbol":"AAPL","price":101.5},{"symbol":"MSFT","price":"160.00"}]"#).unwrap();
        let series = derive_chart_series(&batch);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].price, dec("101.5"));
    }

    #[test]
    fn test_non_numeric_json_prices_are_dropped_per_entry() {
        let batch: ReceivedBatch = serde_json::from_str(
            r#"[{"symbol":"AAPL","price":"101.23"},{"symbol":"GOOG","price":null},{"symbol":"IBM","price":true},{"symbol":"TSLA"},{"symbol":"MSFT","price":"160.00"}]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[3].price, RawPrice::Other(serde_json::Value::Null));

        let points: Vec<_> = derive_chart_series(&batch).into_iter().map(|p| p.label).collect();
        assert_eq!(points, vec!["T1", "T5"]);
        assert!(matches!(batch[2].parse_price(), Err(FeedError::MalformedQuote { ref price, .. }) if price == "true"));
    }

    #[test]
    fn test_parse_price_errors_are_malformed_quote() {
        let quote = RawQuote::new("GOOG", "");
        assert!(matches!(quote.parse_price(), Err(FeedError::MalformedQuote { .. })));
        assert_eq!(RawQuote::new("AAPL", " 99.10 ").parse_price().unwrap(), dec("99.10"));
    }

    #[test]
    fn test_empty_batch_gives_empty_series() {
        assert!(derive_chart_series(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn chart_has_one_point_per_valid_quote(cents in proptest::collection::vec(0i64..10_000_000, 0..40)) {
            let batch: ReceivedBatch = cents
                .iter()
                .enumerate()
                .map(|(i, c)| RawQuote::new(&format!("S{}", i), &Decimal::new(*c, 2).to_string()))
                .collect();
            let series = derive_chart_series(&batch);

            prop_assert_eq!(series.len(), batch.len());
            for (i, point) in series.iter().enumerate() {
                prop_assert_eq!(&point.label, &format!("T{}", i + 1));
                prop_assert_eq!(point.price, Decimal::new(cents[i], 2));
            }
        }

        #[test]
        fn malformed_entries_never_shift_labels(valid in proptest::collection::vec(any::<bool>(), 0..40)) {
            let batch: ReceivedBatch = valid
                .iter()
                .map(|ok| if *ok { RawQuote::new("AAPL", "101.23") } else { RawQuote::new("AAPL", "n/a") })
                .collect();
            let labels: Vec<_> = derive_chart_series(&batch).into_iter().map(|p| p.label).collect();
            let expected: Vec<_> = valid
                .iter()
                .enumerate()
                .filter(|(_, ok)| **ok)
                .map(|(i, _)| format!("T{}", i + 1))
                .collect();
            prop_assert_eq!(labels, expected);
        }
    }
}
