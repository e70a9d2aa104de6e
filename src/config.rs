//! Configuration module for the order book maintainer and venue router

use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MarketDataError, Result};
use crate::orderbook::MaintainerSettings;
use crate::venue::RouterSettings;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Venues to maintain books for (e.g., ["binance", "kraken"])
    pub venues: Vec<String>,

    /// Trading symbols maintained on every venue (e.g., ["BTCUSDT", "ETHUSDT"])
    pub symbols: Vec<String>,

    /// REST endpoint of the normalized snapshot gateway
    pub rest_endpoint: String,

    /// WebSocket endpoint of the normalized delta gateway
    pub ws_endpoint: String,

    /// Order book depth levels returned in views
    pub depth_levels: usize,

    /// Band around mid for depth aggregates (0.01 = 1%)
    pub depth_band_pct: Decimal,

    pub stale_threshold_ms: u64,
    pub resync_debounce_ms: u64,

    /// Snapshot retry settings
    pub snapshot_retry_base_ms: u64,
    pub snapshot_retry_max_ms: u64,

    /// Consecutive snapshot failures before a pair reports unhealthy
    pub unhealthy_after_failures: u32,

    /// Staleness sweep and metrics sync interval in seconds
    pub health_check_interval_secs: u64,

    /// Rate budget floor for high-urgency routing
    pub min_rate_remaining: u32,

    /// Port of the health/metrics/routing HTTP server
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let venues = list_var("VENUES", &defaults.venues, |s| s.to_lowercase());
        let symbols = list_var("SYMBOLS", &defaults.symbols, |s| s.to_uppercase());

        let config = Self {
            venues,
            symbols,
            rest_endpoint: env::var("REST_ENDPOINT").unwrap_or(defaults.rest_endpoint),
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            depth_levels: parsed_var("DEPTH_LEVELS", defaults.depth_levels),
            depth_band_pct: parsed_var("DEPTH_BAND_PCT", defaults.depth_band_pct),
            stale_threshold_ms: parsed_var("STALE_THRESHOLD_MS", defaults.stale_threshold_ms),
            resync_debounce_ms: parsed_var("RESYNC_DEBOUNCE_MS", defaults.resync_debounce_ms),
            snapshot_retry_base_ms: parsed_var(
                "SNAPSHOT_RETRY_BASE_MS",
                defaults.snapshot_retry_base_ms,
            ),
            snapshot_retry_max_ms: parsed_var("SNAPSHOT_RETRY_MAX_MS", defaults.snapshot_retry_max_ms),
            unhealthy_after_failures: parsed_var(
                "UNHEALTHY_AFTER_FAILURES",
                defaults.unhealthy_after_failures,
            ),
            health_check_interval_secs: parsed_var(
                "HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval_secs,
            ),
            min_rate_remaining: parsed_var("MIN_RATE_REMAINING", defaults.min_rate_remaining),
            http_port: parsed_var("HTTP_PORT", defaults.http_port),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the maintainer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.venues.is_empty() || self.symbols.is_empty() {
            return Err(MarketDataError::ConfigError(
                "VENUES and SYMBOLS must each name at least one entry".to_string(),
            ));
        }
        if self.depth_band_pct <= Decimal::ZERO || self.depth_band_pct >= Decimal::ONE {
            return Err(MarketDataError::ConfigError(format!(
                "DEPTH_BAND_PCT must be in (0, 1), got {}",
                self.depth_band_pct
            )));
        }
        if self.snapshot_retry_base_ms == 0 || self.snapshot_retry_max_ms < self.snapshot_retry_base_ms {
            return Err(MarketDataError::ConfigError(format!(
                "snapshot retry delays must satisfy 0 < base ({}) <= max ({})",
                self.snapshot_retry_base_ms, self.snapshot_retry_max_ms
            )));
        }
        Ok(())
    }

    /// Every (venue, symbol) pair to maintain
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.venues
            .iter()
            .flat_map(|venue| {
                self.symbols
                    .iter()
                    .map(move |symbol| (venue.clone(), symbol.clone()))
            })
            .collect()
    }

    pub fn maintainer_settings(&self) -> MaintainerSettings {
        MaintainerSettings {
            view_depth: self.depth_levels,
            depth_band_pct: self.depth_band_pct,
            stale_threshold: Duration::from_millis(self.stale_threshold_ms),
            resync_debounce: Duration::from_millis(self.resync_debounce_ms),
            retry_base: Duration::from_millis(self.snapshot_retry_base_ms),
            retry_max: Duration::from_millis(self.snapshot_retry_max_ms),
            unhealthy_after_failures: self.unhealthy_after_failures,
        }
    }

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            min_rate_remaining: self.min_rate_remaining,
            ..RouterSettings::default()
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venues: vec![
                "binance".to_string(),
                "coinbase".to_string(),
                "kraken".to_string(),
            ],
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            rest_endpoint: "http://127.0.0.1:8080/api/v1".to_string(),
            ws_endpoint: "ws://127.0.0.1:8080/ws".to_string(),
            depth_levels: 20,
            depth_band_pct: Decimal::new(1, 2),
            stale_threshold_ms: 30_000,
            resync_debounce_ms: 2_000,
            snapshot_retry_base_ms: 500,
            snapshot_retry_max_ms: 30_000,
            unhealthy_after_failures: 5,
            health_check_interval_secs: 5,
            min_rate_remaining: 10,
            http_port: 9090,
        }
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn list_var(name: &str, default: &[String], normalize: fn(&str) -> String) -> Vec<String> {
    match env::var(name) {
        Ok(value) => parse_list(&value, normalize),
        Err(_) => default.to_vec(),
    }
}

fn parse_list(value: &str, normalize: fn(&str) -> String) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(normalize)
        .collect()
}
