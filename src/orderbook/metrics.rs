//! Book aggregates derived from a depth book

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Computed spread, depth and imbalance for one book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAggregates {
    pub venue: String,
    pub symbol: String,

    /// Mid price (average of best bid and ask)
    pub mid_price: Option<Decimal>,

    /// Spread in basis points (zero when one-sided)
    pub spread_bps: Decimal,

    /// Simple imbalance over the top 5 levels: (bid_vol - ask_vol) / (bid_vol + ask_vol)
    pub imbalance: Option<Decimal>,

    /// Total bid depth (volume)
    pub bid_depth: Decimal,

    /// Total ask depth (volume)
    pub ask_depth: Decimal,

    /// Notional resting within the configured band around mid
    pub depth_notional: Decimal,

    /// Number of bid levels
    pub bid_levels: usize,

    /// Number of ask levels
    pub ask_levels: usize,

    pub seq: u64,

    /// Set by the maintainer when the book is not synced
    pub stale: bool,
}

impl BookAggregates {
    /// Both sides have at least one level
    pub fn is_two_sided(&self) -> bool {
        self.mid_price.is_some() && self.bid_levels > 0 && self.ask_levels > 0
    }

    pub fn spread_bps_f64(&self) -> f64 {
        self.spread_bps.to_f64().unwrap_or(0.0)
    }

    pub fn depth_notional_f64(&self) -> f64 {
        self.depth_notional.to_f64().unwrap_or(0.0)
    }
}
