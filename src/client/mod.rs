pub mod chart;
pub mod feed;
pub mod reducer;

pub use chart::{derive_chart_series, ChartPoint, RawPrice, RawQuote, ReceivedBatch};
pub use feed::{decode_event, fetch_snapshot, push_url, stream_pushes};
pub use reducer::{ClientState, DashboardView, DisplayHistory, Theme};
