use log::{info, warn, error};

use stock_socket::client::{fetch_snapshot, push_url, stream_pushes, ClientState, DashboardView};
use stock_socket::config::ClientConfig;

// Stand-in for the rendering layer: one log line per quote and per chart point.
fn render(view: &DashboardView) {
    info!("[{} theme] filter: {:?}, batches kept: {}", view.theme, view.filter, view.history.len());

    match view.history.last() {
        Some(batch) => {
            for quote in batch {
                info!("  {:<6} {}", quote.symbol, quote.price);
            }
        }
        None => info!("  Loading stock data..."),
    }

    let series: Vec<String> = view.chart.iter().map(|p| format!("{}={}", p.label, p.price)).collect();
    info!("  Chart: {}", series.join(" "));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    let mut state = ClientState::new(config.retention_cap());
    state.set_theme(config.theme);
    state.set_filter(&config.symbol_filter);
    let search = state.submit_search().unwrap_or_default();

    let http = reqwest::Client::new();
    match fetch_snapshot(&http, &config.api_url, &search).await {
        Ok(batch) => {
            state.on_snapshot(batch);
            render(&state.view());
        }
        Err(e) => warn!("Initial snapshot failed, waiting for live data: {}", e),
    }

    let ws_url = push_url(&config.ws_url, &search);
    let stream = stream_pushes(&ws_url, |batch| {
        state.on_push(batch);
        render(&state.view());
    });

    tokio::select! {
        result = stream => {
            if let Err(e) = result {
                error!("Live feed ended: {}", e);
                return Err(e.into());
            }
            info!("Live feed closed by server");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Dashboard shutting down");
        }
    }

    Ok(())
}
