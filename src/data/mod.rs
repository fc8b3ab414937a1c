pub mod quote;
pub mod source;

pub use quote::{Batch, Quote, StockEvent, StockQuery, SymbolFilter, STOCK_DATA_EVENT};
pub use source::{Instrument, QuoteSource, RandomQuoteSource};
