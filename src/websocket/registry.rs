use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::data::{QuoteSource, StockQuery, SymbolFilter};
use crate::websocket::session::{BroadcastSession, CloseReason, SessionLifecycle, SessionReport, SessionSettings};

const ACCEPT_BACKOFF_MS: u64 = 100;

// Decrements the live count exactly once, however the connection task ends.
struct SessionGuard {
    live: Arc<AtomicUsize>,
}

impl SessionGuard {
    fn acquire(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { live: live.clone() }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accepts WebSocket clients and runs one [`BroadcastSession`] per connection.
pub struct ConnectionRegistry<S> {
    source: Arc<S>,
    settings: SessionSettings,
    live: Arc<AtomicUsize>,
}

impl<S: QuoteSource> ConnectionRegistry<S> {
    pub fn new(source: Arc<S>, settings: SessionSettings) -> Self {
        Self {
            source,
            settings,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Shared live-session counter, for reporting outside the registry.
    pub fn live_counter(&self) -> Arc<AtomicUsize> {
        self.live.clone()
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        info!("Ready to accept WebSocket connections");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = self.clone();
                    tokio::spawn(async move {
                        registry.handle_connection(stream, addr.to_string()).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(ACCEPT_BACKOFF_MS)).await;
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer_addr: String) {
        let mut query: Option<String> = None;

        let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
            let path = req.uri().path();
            debug!("WebSocket connection request for path: {} from {}", path, peer_addr);

            match path {
                "/" | "/ws" => {
                    query = req.uri().query().map(str::to_owned);
                    Ok(response)
                }
                _ => {
                    warn!("Unknown WebSocket path '{}' from {}", path, peer_addr);
                    Err(error_response(StatusCode::NOT_FOUND, "Invalid WebSocket path"))
                }
            }
        }).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {:?}", peer_addr, e);
                return;
            }
        };

        let filter = StockQuery::from_query_string(query.as_deref()).filter();
        let report = self.run_session(ws_stream, peer_addr.clone(), filter).await;

        info!("WebSocket connection closed - Session: {} from {} ({} pushes, {:?})",
              &report.id.to_string()[..8], peer_addr, report.pushed, report.reason);
    }

    async fn run_session(
        &self,
        ws_stream: WebSocketStream<TcpStream>,
        peer_addr: String,
        filter: SymbolFilter,
    ) -> SessionReport {
        let _guard = SessionGuard::acquire(&self.live);
        let (write, read) = ws_stream.split();

        let session = BroadcastSession::new(peer_addr.clone(), self.source.clone(), filter, self.settings);
        info!("WebSocket connection established - Session: {} from {}", &session.id().to_string()[..8], peer_addr);

        let read_task = spawn_read_task(read, session.lifecycle(), peer_addr);
        let report = session.run(write).await;

        // The reader may still be parked on the socket after a failed push.
        read_task.abort();
        report
    }
}

fn error_response(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}

fn spawn_read_task(
    mut read: futures::stream::SplitStream<WebSocketStream<TcpStream>>,
    lifecycle: Arc<SessionLifecycle>,
    peer_addr: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Close(close_frame)) => {
                    info!("Received close frame from {}: {:?}", peer_addr, close_frame);
                    lifecycle.request_stop(CloseReason::ClientClosed);
                    return;
                }
                Ok(Message::Text(text)) => {
                    debug!("Ignoring text message from {}: {}", peer_addr, text);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Error reading from {}: {}", peer_addr, e);
                    lifecycle.request_stop(CloseReason::TransportFailure);
                    return;
                }
            }
        }

        // Stream ended without a close frame.
        lifecycle.request_stop(CloseReason::ClientClosed);
    })
}

pub fn spawn_stats_task(live: Arc<AtomicUsize>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval_timer = interval(every);

        loop {
            interval_timer.tick().await;
            info!("Active sessions: {}", live.load(Ordering::SeqCst));
        }
    })
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use tokio::time::{sleep, timeout, Instant};
    use tokio_tungstenite::connect_async;

    use super::*;
    use crate::data::{Batch, Quote, StockEvent};
    use crate::error::Result;

    struct FixedSource;

    impl QuoteSource for FixedSource {
        fn produce(&self) -> impl Future<Output = Result<Batch>> + Send {
            async { Ok(vec![Quote::from_cents("AAPL", 10123), Quote::from_cents("MSFT", 16000)]) }
        }
    }

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            emission_interval: Duration::from_millis(50),
            push_timeout: Duration::from_millis(40),
            source_timeout: Duration::from_millis(40),
        }
    }

    async fn start_registry() -> (Arc<ConnectionRegistry<FixedSource>>, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(FixedSource), fast_settings()));
        tokio::spawn(registry.clone().serve(listener));
        (registry, format!("ws://{}", addr))
    }

    async fn wait_for_live(registry: &ConnectionRegistry<FixedSource>, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while registry.live_sessions() != expected {
            assert!(Instant::now() < deadline, "live sessions stuck at {}", registry.live_sessions());
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn next_event<T>(ws: &mut WebSocketStream<T>) -> StockEvent
    where
        T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[test]
    fn test_session_guard_releases_once() {
        let live = Arc::new(AtomicUsize::new(0));
        let first = SessionGuard::acquire(&live);
        let second = SessionGuard::acquire(&live);
        assert_eq!(live.load(Ordering::SeqCst), 2);

        drop(first);
        drop(second);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_receives_pushes_and_releases_session() {
        let (registry, url) = start_registry().await;
        let (mut ws, _) = connect_async(format!("{}/ws", url)).await.unwrap();

        let event = next_event(&mut ws).await;
        assert_eq!(event.data.len(), 2);
        wait_for_live(&registry, 1).await;

        ws.close(None).await.unwrap();
        wait_for_live(&registry, 0).await;
    }

    #[tokio::test]
    async fn test_live_sessions_track_open_connections() {
        let (registry, url) = start_registry().await;

        let (mut first, _) = connect_async(format!("{}/ws", url)).await.unwrap();
        let (second, _) = connect_async(url.clone()).await.unwrap();
        next_event(&mut first).await;
        wait_for_live(&registry, 2).await;

        // Dropping the socket without a close frame is a transport-level close.
        drop(second);
        wait_for_live(&registry, 1).await;

        first.close(None).await.unwrap();
        wait_for_live(&registry, 0).await;
    }

    #[tokio::test]
    async fn test_query_filter_applies_to_session() {
        let (_registry, url) = start_registry().await;
        let (mut ws, _) = connect_async(format!("{}/ws?symbol=msft", url)).await.unwrap();

        let event = next_event(&mut ws).await;
        assert_eq!(event.data, vec![Quote::from_cents("MSFT", 16000)]);
    }

    #[tokio::test]
    async fn test_unknown_path_is_rejected() {
        let (registry, url) = start_registry().await;
        assert!(connect_async(format!("{}/admin", url)).await.is_err());
        assert_eq!(registry.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_no_push_after_close() {
        let (registry, url) = start_registry().await;
        let (mut ws, _) = connect_async(format!("{}/ws", url)).await.unwrap();
        next_event(&mut ws).await;

        ws.close(None).await.unwrap();
        // Frames already in flight may still arrive; the server must finish the close handshake.
        let drained = timeout(Duration::from_secs(2), async {
            while let Some(frame) = ws.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        })
        .await;
        assert!(drained.is_ok());
        wait_for_live(&registry, 0).await;
    }
}
