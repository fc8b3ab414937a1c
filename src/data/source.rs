use std::future::Future;
use rand::Rng;

use crate::data::quote::{Batch, Quote};
use crate::error::Result;

/// Produces the current batch of quotes on demand.
///
/// Implementations are shared by every session through an `Arc` and may be
/// called concurrently, so each call must be independent of the others. A
/// source backed by a real upstream reports failure with
/// [`FeedError::SourceUnavailable`](crate::error::FeedError::SourceUnavailable)
/// rather than returning an empty batch.
pub trait QuoteSource: Send + Sync + 'static {
    fn produce(&self) -> impl Future<Output = Result<Batch>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,
    /// Lowest generated price, in cents.
    pub floor_cents: i64,
    /// Width of the generated range, in cents (exclusive upper bound).
    pub range_cents: i64,
}

impl Instrument {
    pub fn new(symbol: &str, floor_cents: i64, range_cents: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            floor_cents,
            range_cents,
        }
    }
}

// Uniform random prices inside a fixed band per instrument
pub struct RandomQuoteSource {
    instruments: Vec<Instrument>,
}

impl RandomQuoteSource {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self { instruments }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    fn generate(&self) -> Batch {
        // thread_rng is thread-local, so concurrent sessions never share generator state.
        let mut rng = rand::thread_rng();
        self.instruments
            .iter()
            .map(|instrument| {
                let offset = rng.gen_range(0..instrument.range_cents.max(1));
                Quote::from_cents(instrument.symbol.clone(), instrument.floor_cents + offset)
            })
            .collect()
    }
}

impl Default for RandomQuoteSource {
    fn default() -> Self {
        Self::new(vec![
            Instrument::new("AAPL", 100_00, 50_00),
            Instrument::new("GOOG", 1000_00, 100_00),
            Instrument::new("MSFT", 150_00, 30_00),
        ])
    }
}

impl QuoteSource for RandomQuoteSource {
    fn produce(&self) -> impl Future<Output = Result<Batch>> + Send {
        let batch = self.generate();
        async move { Ok(batch) }
    }
}
