use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use futures::{Sink, SinkExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_EMISSION_INTERVAL_MS, DEFAULT_PUSH_TIMEOUT_MS, DEFAULT_SOURCE_TIMEOUT_MS};
use crate::data::{QuoteSource, StockEvent, SymbolFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    ClientClosed,
    TransportFailure,
    PushTimeout,
}

/// Lifecycle of one broadcast session. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Active,
    Stopping(CloseReason),
    Stopped(CloseReason),
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Stopped(_))
    }
}

/// Shared handle on a session's state, held by the emitter and the connection reader.
pub struct SessionLifecycle {
    state: watch::Sender<SessionState>,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Active);
        Self { state }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Moves `Active -> Stopping`. Only the first caller wins; later calls return `false`.
    pub fn request_stop(&self, reason: CloseReason) -> bool {
        self.state.send_if_modified(|state| match state {
            SessionState::Active => {
                *state = SessionState::Stopping(reason);
                true
            }
            _ => false,
        })
    }

    pub async fn wait_stopped(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(SessionState::is_stopped).await;
    }

    fn mark_stopped(&self, fallback: CloseReason) -> CloseReason {
        let mut reason = fallback;
        self.state.send_modify(|state| {
            if let SessionState::Stopping(r) | SessionState::Stopped(r) = *state {
                reason = r;
            }
            *state = SessionState::Stopped(reason);
        });
        reason
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

async fn stop_requested(rx: &mut watch::Receiver<SessionState>) {
    // A dropped sender also counts as a stop.
    let _ = rx.wait_for(|state| !state.is_active()).await;
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub emission_interval: Duration,
    pub push_timeout: Duration,
    pub source_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            emission_interval: config.emission_interval(),
            push_timeout: config.push_timeout(),
            source_timeout: config.source_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            emission_interval: Duration::from_millis(DEFAULT_EMISSION_INTERVAL_MS),
            push_timeout: Duration::from_millis(DEFAULT_PUSH_TIMEOUT_MS),
            source_timeout: Duration::from_millis(DEFAULT_SOURCE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub pushed: u64,
    pub reason: CloseReason,
}

enum TickOutcome {
    Pushed,
    Skipped,
    Disconnected(CloseReason),
}

pub struct BroadcastSession<S> {
    id: Uuid,
    peer_addr: String,
    source: Arc<S>,
    filter: SymbolFilter,
    settings: SessionSettings,
    lifecycle: Arc<SessionLifecycle>,
}

impl<S: QuoteSource> BroadcastSession<S> {
    pub fn new(peer_addr: String, source: Arc<S>, filter: SymbolFilter, settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            source,
            filter,
            settings,
            lifecycle: Arc::new(SessionLifecycle::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn lifecycle(&self) -> Arc<SessionLifecycle> {
        self.lifecycle.clone()
    }

    fn tag(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    /// Pushes one batch per emission interval into `sink` until the session is asked
    /// to stop or a push fails. The first push happens one interval after the call.
    pub async fn run<W>(self, mut sink: W) -> SessionReport
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
    {
        let period = self.settings.emission_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop_rx = self.lifecycle.subscribe();
        let mut pushed = 0u64;

        info!("Session {} active for {} (every {:?})", self.tag(), self.peer_addr, period);

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                _ = ticker.tick() => {}
            }

            // A stop that lands mid-tick drops the in-flight source call or push.
            let outcome = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                outcome = self.emit(&mut sink) => outcome,
            };

            match outcome {
                TickOutcome::Pushed => pushed += 1,
                TickOutcome::Skipped => {}
                TickOutcome::Disconnected(reason) => {
                    self.lifecycle.request_stop(reason);
                    break;
                }
            }
        }

        drop(ticker);
        if timeout(self.settings.push_timeout, sink.close()).await.is_err() {
            debug!("Session {}: close frame not flushed in time", self.tag());
        }

        let reason = self.lifecycle.mark_stopped(CloseReason::ClientClosed);
        info!("Session {} stopped for {} after {} pushes ({:?})", self.tag(), self.peer_addr, pushed, reason);

        SessionReport {
            id: self.id,
            pushed,
            reason,
        }
    }

    async fn emit<W>(&self, sink: &mut W) -> TickOutcome
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
    {
        let batch = match timeout(self.settings.source_timeout, self.source.produce()).await {
            Ok(Ok(batch)) => self.filter.apply(batch),
            Ok(Err(e)) => {
                warn!("Session {}: skipping tick, {}", self.tag(), e);
                return TickOutcome::Skipped;
            }
            Err(_) => {
                warn!("Session {}: skipping tick, quote source took longer than {:?}", self.tag(), self.settings.source_timeout);
                return TickOutcome::Skipped;
            }
        };

        let frame = match StockEvent::stock_data(batch).to_json() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Session {}: failed to serialize batch: {}", self.tag(), e);
                return TickOutcome::Skipped;
            }
        };

        match timeout(self.settings.push_timeout, sink.send(Message::Text(frame))).await {
            Ok(Ok(())) => {
                debug!("Session {}: pushed batch to {}", self.tag(), self.peer_addr);
                TickOutcome::Pushed
            }
            Ok(Err(e)) => {
                info!("Session {}: connection to {} gone: {}", self.tag(), self.peer_addr, e);
                TickOutcome::Disconnected(CloseReason::TransportFailure)
            }
            Err(_) => {
                warn!("Session {}: push to {} exceeded {:?}", self.tag(), self.peer_addr, self.settings.push_timeout);
                TickOutcome::Disconnected(CloseReason::PushTimeout)
            }
        }
    }
}
