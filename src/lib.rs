//! Real-time stock quote distribution.
//!
//! The server side produces quote batches ([`data`]), pushes them to every
//! WebSocket client on a fixed interval ([`websocket`]) and answers one-shot
//! snapshot requests over HTTP ([`api`]). The [`client`] module folds what a
//! dashboard receives into a bounded history and a chart series.

pub mod api;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod websocket;

pub use error::{FeedError, Result};
