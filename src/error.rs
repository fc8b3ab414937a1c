use std::io;

use thiserror::Error;

/// Error type shared by the server and the dashboard client.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The quote source could not produce a batch (upstream down, timed out).
    #[error("Quote source unavailable: {0}")]
    SourceUnavailable(String),

    /// A received quote carried a price that is not a valid decimal.
    #[error("Malformed quote for {symbol}: unparseable price {price:?}")]
    MalformedQuote { symbol: String, price: String },

    /// The connection went away underneath a push or read.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FeedError>;
