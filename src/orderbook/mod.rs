//! Order book module
//!
//! Maintains sequence-consistent depth books per (venue, symbol) from an
//! initial snapshot plus incremental deltas.

mod book;
mod manager;
mod metrics;
mod resync;

pub use book::{DeltaOutcome, DepthBook};
pub use manager::{BookHealth, BookMaintainer, MaintainerSettings};
pub use metrics::BookAggregates;
pub use resync::ResyncTimer;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::parser::DepthLevel;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// Synchronization state of a maintained book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    /// No snapshot applied yet
    Uninitialized,
    /// Snapshot applied and deltas applying in sequence
    Synced,
    /// Gap, disconnect or staleness detected; waiting for resync
    Stale,
}

/// Read-only view of the top of a book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookView {
    pub venue: String,
    pub symbol: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub seq: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub spread_bps: Decimal,
    pub mid_price: Option<Decimal>,
    pub status: BookStatus,
    /// Data is returned even when stale, but flagged
    pub stale: bool,
}
