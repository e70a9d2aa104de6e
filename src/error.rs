//! Error types for the order book maintainer and venue router

use thiserror::Error;

use crate::venue::Rejection;

/// Market data and routing errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Feed connection error: {0}")]
    FeedConnection(String),

    #[error("Feed message error: {0}")]
    FeedMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Snapshot fetch failed for {venue}/{symbol}: {reason}")]
    SnapshotFetch {
        venue: String,
        symbol: String,
        reason: String,
    },

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    #[error("No book maintained for {venue}/{symbol}")]
    UnknownBook { venue: String, symbol: String },

    #[error("No suitable venue for {symbol} ({} candidates rejected)", rejections.len())]
    NoSuitableVenue {
        symbol: String,
        rejections: Vec<Rejection>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Book maintainer has been shut down")]
    ShutDown,
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketDataError::FeedConnection(err.to_string())
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        MarketDataError::FeedConnection(err.to_string())
    }
}

impl From<prometheus::Error> for MarketDataError {
    fn from(err: prometheus::Error) -> Self {
        MarketDataError::Telemetry(err.to_string())
    }
}

impl From<std::io::Error> for MarketDataError {
    fn from(err: std::io::Error) -> Self {
        MarketDataError::FeedConnection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
