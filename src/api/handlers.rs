use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::data::{Batch, QuoteSource, StockQuery};

pub struct ApiState<S> {
    pub source: Arc<S>,
    pub live_sessions: Arc<AtomicUsize>,
    pub source_timeout: Duration,
}

// Derived Clone would require `S: Clone`
impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            live_sessions: self.live_sessions.clone(),
            source_timeout: self.source_timeout,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub live_sessions: usize,
}

// GET /stocks - One-shot snapshot, optionally filtered by ?symbol=AAPL,MSFT
pub async fn get_stocks<S: QuoteSource>(
    State(state): State<ApiState<S>>,
    Query(query): Query<StockQuery>,
) -> Result<Json<Batch>, (StatusCode, Json<ErrorResponse>)> {
    let filter = query.filter();

    let batch = match timeout(state.source_timeout, state.source.produce()).await {
        Ok(Ok(batch)) => batch,
        Ok(Err(e)) => {
            warn!("Snapshot request failed: {}", e);
            return Err(unavailable(e.to_string()));
        }
        Err(_) => {
            warn!("Snapshot request timed out after {:?}", state.source_timeout);
            return Err(unavailable("Quote source timed out".to_string()));
        }
    };

    let batch = filter.apply(batch);
    info!("Served snapshot with {} quotes", batch.len());
    Ok(Json(batch))
}

// GET /health - Liveness plus current session count
pub async fn health<S: QuoteSource>(State(state): State<ApiState<S>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        live_sessions: state.live_sessions.load(Ordering::SeqCst),
    })
}

fn unavailable(message: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: message }))
}

pub fn create_api_router<S: QuoteSource>(state: ApiState<S>) -> Router {
    Router::new()
        .route("/stocks", get(get_stocks::<S>))
        .route("/health", get(health::<S>))
        .with_state(state)
}
