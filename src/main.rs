use std::sync::Arc;
use std::time::Duration;
use log::{info, error};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use stock_socket::api::{create_api_router, ApiState};
use stock_socket::config::{Config, STATS_INTERVAL_SECS};
use stock_socket::data::RandomQuoteSource;
use stock_socket::websocket::{spawn_stats_task, ConnectionRegistry, SessionSettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    let source = Arc::new(RandomQuoteSource::default());
    let registry = Arc::new(ConnectionRegistry::new(source.clone(), SessionSettings::from_config(&config)));

    // Start API server
    let api_state = ApiState {
        source,
        live_sessions: registry.live_counter(),
        source_timeout: config.source_timeout(),
    };

    let api_router = create_api_router(api_state)
        .layer(CorsLayer::permissive()); // Enable CORS for browser dashboards

    let api_listener = TcpListener::bind(&config.api_bind_address).await?;
    info!("🌐 HTTP API server running at http://{}", config.api_bind_address);

    let api_server = axum::serve(api_listener, api_router);

    // Start WebSocket server
    let ws_listener = TcpListener::bind(&config.bind_address).await?;
    info!("🚀 WebSocket server running at ws://{}/ws", config.bind_address);
    info!("📊 Pushing stockData every {} ms to each connection", config.emission_interval_ms);

    let stats_task = spawn_stats_task(registry.live_counter(), Duration::from_secs(STATS_INTERVAL_SECS));

    tokio::select! {
        result = api_server => {
            error!("API server stopped: {:?}", result);
        }
        _ = registry.clone().serve(ws_listener) => {
            error!("WebSocket server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, {} sessions still open", registry.live_sessions());
        }
    }

    stats_task.abort();
    Ok(())
}
