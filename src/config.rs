use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use log::{info, warn};

use crate::client::Theme;
use crate::error::{FeedError, Result};

// Server Configuration
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_API_BIND_ADDRESS: &str = "127.0.0.1:5000";
pub const STATS_INTERVAL_SECS: u64 = 60;

// Emission Configuration
pub const DEFAULT_EMISSION_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_PUSH_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 1000;

// Client Configuration
pub const DEFAULT_SERVER_WS_URL: &str = "ws://127.0.0.1:8080/ws";
pub const DEFAULT_SERVER_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_HISTORY_CAP: usize = 50;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

pub struct Config {
    pub bind_address: String,
    pub api_bind_address: String,
    pub emission_interval_ms: u64,
    pub push_timeout_ms: u64,
    pub source_timeout_ms: u64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_API_BIND_ADDRESS.to_string()),
            emission_interval_ms: env_or("EMISSION_INTERVAL_MS", DEFAULT_EMISSION_INTERVAL_MS),
            push_timeout_ms: env_or("PUSH_TIMEOUT_MS", DEFAULT_PUSH_TIMEOUT_MS),
            source_timeout_ms: env_or("SOURCE_TIMEOUT_MS", DEFAULT_SOURCE_TIMEOUT_MS),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, address) in [("BIND_ADDRESS", &self.bind_address), ("API_BIND_ADDRESS", &self.api_bind_address)] {
            if address.parse::<SocketAddr>().is_err() {
                return Err(FeedError::Config(format!("{} is not a socket address: {}", name, address)));
            }
        }

        if self.bind_address == self.api_bind_address {
            return Err(FeedError::Config("WebSocket and HTTP API must bind different addresses".to_string()));
        }

        if self.emission_interval_ms == 0 {
            return Err(FeedError::Config("EMISSION_INTERVAL_MS must be greater than zero".to_string()));
        }

        // A push or source call must fit inside one tick.
        if self.push_timeout_ms == 0 || self.push_timeout_ms >= self.emission_interval_ms {
            return Err(FeedError::Config(format!(
                "PUSH_TIMEOUT_MS ({}) must be between 1 and EMISSION_INTERVAL_MS ({})",
                self.push_timeout_ms, self.emission_interval_ms
            )));
        }

        if self.source_timeout_ms == 0 || self.source_timeout_ms >= self.emission_interval_ms {
            return Err(FeedError::Config(format!(
                "SOURCE_TIMEOUT_MS ({}) must be between 1 and EMISSION_INTERVAL_MS ({})",
                self.source_timeout_ms, self.emission_interval_ms
            )));
        }

        Ok(())
    }

    pub fn emission_interval(&self) -> Duration {
        Duration::from_millis(self.emission_interval_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn log_config(&self) {
        info!("Server Configuration:");
        info!("  WebSocket Bind Address: {}", self.bind_address);
        info!("  HTTP API Bind Address: {}", self.api_bind_address);
        info!("  Emission Interval: {} ms", self.emission_interval_ms);
        info!("  Push Timeout: {} ms", self.push_timeout_ms);
        info!("  Source Timeout: {} ms", self.source_timeout_ms);
        info!("  Log Level: {}", self.log_level);
    }
}

pub struct ClientConfig {
    pub ws_url: String,
    pub api_url: String,
    /// Maximum number of batches kept in the display history; `0` keeps everything.
    pub history_cap: usize,
    pub symbol_filter: String,
    pub theme: Theme,
    pub log_level: String,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            ws_url: env::var("SERVER_WS_URL")
                .unwrap_or_else(|_| DEFAULT_SERVER_WS_URL.to_string()),
            api_url: env::var("SERVER_API_URL")
                .unwrap_or_else(|_| DEFAULT_SERVER_API_URL.to_string()),
            history_cap: env_or("HISTORY_CAP", DEFAULT_HISTORY_CAP),
            symbol_filter: env::var("SYMBOL_FILTER").unwrap_or_default(),
            theme: env_or("DASHBOARD_THEME", Theme::default()),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn retention_cap(&self) -> Option<usize> {
        (self.history_cap > 0).then_some(self.history_cap)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(FeedError::Config(format!("SERVER_WS_URL must be a ws:// or wss:// URL: {}", self.ws_url)));
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(FeedError::Config(format!("SERVER_API_URL must be an http:// or https:// URL: {}", self.api_url)));
        }

        Ok(())
    }

    pub fn log_config(&self) {
        info!("Dashboard Configuration:");
        info!("  WebSocket URL: {}", self.ws_url);
        info!("  API URL: {}", self.api_url);
        info!("  History Cap: {}", self.history_cap);
        info!("  Symbol Filter: {:?}", self.symbol_filter);
        info!("  Theme: {}", self.theme);
    }
}
