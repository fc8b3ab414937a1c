use futures::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::client::chart::ReceivedBatch;
use crate::data::STOCK_DATA_EVENT;
use crate::error::{FeedError, Result};

#[derive(Debug, Deserialize)]
struct InboundEvent {
    event: String,
    #[serde(default)]
    data: ReceivedBatch,
}

/// Decodes one pushed frame. Events other than `stockData` yield `None`.
pub fn decode_event(text: &str) -> Result<Option<ReceivedBatch>> {
    let event: InboundEvent = serde_json::from_str(text)?;
    if event.event != STOCK_DATA_EVENT {
        debug!("Ignoring {} event", event.event);
        return Ok(None);
    }
    Ok(Some(event.data))
}

fn snapshot_url(api_url: &str) -> String {
    format!("{}/stocks", api_url.trim_end_matches('/'))
}

/// Appends `?symbol=` to the push URL so the server filters the stream too.
pub fn push_url(ws_url: &str, filter: &str) -> String {
    let filter = filter.trim();
    if filter.is_empty() {
        return ws_url.to_string();
    }
    let separator = if ws_url.contains('?') { '&' } else { '?' };
    match serde_urlencoded::to_string([("symbol", filter)]) {
        Ok(query) => format!("{}{}{}", ws_url, separator, query),
        Err(_) => ws_url.to_string(),
    }
}

/// One-shot `GET /stocks`, optionally filtered by symbol.
pub async fn fetch_snapshot(http: &reqwest::Client, api_url: &str, filter: &str) -> Result<ReceivedBatch> {
    let mut request = http.get(snapshot_url(api_url));
    if !filter.trim().is_empty() {
        request = request.query(&[("symbol", filter.trim())]);
    }

    let batch = request
        .send()
        .await?
        .error_for_status()?
        .json::<ReceivedBatch>()
        .await?;

    info!("Fetched snapshot with {} quotes", batch.len());
    Ok(batch)
}

/// Connects to the push channel and hands every `stockData` batch to `on_batch`
/// until the server closes the connection.
pub async fn stream_pushes<F>(ws_url: &str, mut on_batch: F) -> Result<()>
where
    F: FnMut(ReceivedBatch),
{
    let (mut ws_stream, _) = connect_async(ws_url).await?;
    info!("Connected to {}", ws_url);

    while let Some(msg_result) = ws_stream.next().await {
        match msg_result? {
            Message::Text(text) => match decode_event(&text) {
                Ok(Some(batch)) => on_batch(batch),
                Ok(None) => {}
                Err(e) => warn!("Discarding undecodable frame: {}", e),
            },
            Message::Close(close_frame) => {
                info!("Server closed the stream: {:?}", close_frame);
                return Ok(());
            }
            _ => {}
        }
    }

    Err(FeedError::TransportFailure(format!("Connection to {} ended without a close frame", ws_url)))
}
