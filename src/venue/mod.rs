//! Venue quality metrics, scoring and routing
//!
//! The registry keeps live per-(venue, symbol) metrics and scores them; the
//! router turns a routing request into a primary venue plus fallbacks and
//! feeds execution outcomes back into the registry.

pub mod bridge;
mod history;
mod registry;
mod router;
mod scoring;

pub use history::{Outcome, OutcomeLog};
pub use registry::VenueRegistry;
pub use router::{
    RouterSettings, RoutingContext, RoutingStats, SmartVenueRouter, Urgency, VenueSelection,
};
pub use scoring::{score_venue, ScoringWeights};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Spread assumed for a venue until it is measured
pub const DEFAULT_SPREAD_BPS: f64 = 50.0;
/// Latency assumed for a venue until it is measured
pub const DEFAULT_LATENCY_MS: f64 = 100.0;
/// Reliability of a venue with no track record
pub const DEFAULT_RELIABILITY: f64 = 0.5;
/// Request budget assumed until the venue reports one
pub const DEFAULT_RATE_REMAINING: u32 = 1000;

/// Live quality metrics for one (venue, symbol)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueMetrics {
    pub venue: String,
    pub symbol: String,
    pub spread_bps: f64,
    /// Notional near the top of book, in quote currency (USD)
    pub top_depth_usd: f64,
    pub latency_ms: f64,
    /// In [0, 1]
    pub reliability_score: f64,
    pub rate_remaining: u32,
    pub last_update: DateTime<Utc>,
}

impl VenueMetrics {
    /// Conservative defaults for a venue that has not reported yet
    pub fn new(venue: &str, symbol: &str) -> Self {
        Self {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            spread_bps: DEFAULT_SPREAD_BPS,
            top_depth_usd: 0.0,
            latency_ms: DEFAULT_LATENCY_MS,
            reliability_score: DEFAULT_RELIABILITY,
            rate_remaining: DEFAULT_RATE_REMAINING,
            last_update: Utc::now(),
        }
    }
}

/// Partial metric update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueMetricsUpdate {
    pub spread_bps: Option<f64>,
    pub top_depth_usd: Option<f64>,
    pub latency_ms: Option<f64>,
    pub reliability_score: Option<f64>,
    pub rate_remaining: Option<u32>,
}

/// A factor contributing to a venue's score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Spread,
    Latency,
    Depth,
    Reliability,
    DepthShortfall,
    Preferred,
}

/// One auditable scoring contribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreReason {
    pub factor: ScoreFactor,
    /// Observed input (bps, ms, USD, ratio)
    pub value: f64,
    /// Points added to (or, if negative, removed from) the score
    pub contribution: f64,
}

impl fmt::Display for ScoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.factor {
            ScoreFactor::Spread => write!(f, "spread {:.2}bps", self.value)?,
            ScoreFactor::Latency => write!(f, "latency {:.0}ms", self.value)?,
            ScoreFactor::Depth => write!(f, "depth ${:.0}", self.value)?,
            ScoreFactor::Reliability => write!(f, "reliability {:.0}%", self.value * 100.0)?,
            ScoreFactor::DepthShortfall => {
                write!(f, "depth covers {:.0}% of order", self.value * 100.0)?
            }
            ScoreFactor::Preferred => write!(f, "preferred venue")?,
        }
        write!(f, " ({:+.2})", self.contribution)
    }
}

/// Derived score for one venue; recomputed on every routing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueScore {
    pub venue: String,
    pub score: f64,
    pub reasons: Vec<ScoreReason>,
    pub metrics: VenueMetrics,
}

impl VenueScore {
    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }
}

/// Why a candidate was filtered out of a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    SpreadTooWide { spread_bps: f64, max_spread_bps: f64 },
    InsufficientDepth { depth_usd: f64, min_depth_usd: f64 },
    Blacklisted,
    RateLimited { rate_remaining: u32, min_rate_remaining: u32 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SpreadTooWide {
                spread_bps,
                max_spread_bps,
            } => write!(f, "spread {:.2}bps exceeds {:.2}bps", spread_bps, max_spread_bps),
            RejectReason::InsufficientDepth {
                depth_usd,
                min_depth_usd,
            } => write!(f, "depth ${:.0} below ${:.0}", depth_usd, min_depth_usd),
            RejectReason::Blacklisted => write!(f, "blacklisted"),
            RejectReason::RateLimited {
                rate_remaining,
                min_rate_remaining,
            } => write!(
                f,
                "rate budget {} below {} required for high urgency",
                rate_remaining, min_rate_remaining
            ),
        }
    }
}

/// A venue removed from consideration, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub venue: String,
    pub reason: RejectReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.venue, self.reason)
    }
}
