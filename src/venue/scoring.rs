//! Venue scoring
//!
//! Every term is monotonic in its metric: tighter spread, lower latency,
//! deeper book and higher reliability can only raise the score.

use serde::{Deserialize, Serialize};

use super::{ScoreFactor, ScoreReason, VenueMetrics, VenueScore};

/// Weights and scales for the scoring terms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Points for a zero spread; halves at `spread_scale_bps`
    pub spread: f64,
    pub spread_scale_bps: f64,
    /// Points for zero latency; halves at `latency_scale_ms`
    pub latency: f64,
    pub latency_scale_ms: f64,
    /// Points approached as depth grows; half at `depth_scale_usd`
    pub depth: f64,
    pub depth_scale_usd: f64,
    /// Points for a perfect reliability score
    pub reliability: f64,
    /// Points removed when the book holds none of the order size
    pub shortfall_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            spread: 30.0,
            spread_scale_bps: 10.0,
            latency: 20.0,
            latency_scale_ms: 100.0,
            depth: 25.0,
            depth_scale_usd: 1_000_000.0,
            reliability: 25.0,
            shortfall_penalty: 40.0,
        }
    }
}

/// Score one venue for an order of `order_size_usd` notional
pub fn score_venue(metrics: &VenueMetrics, order_size_usd: f64, weights: &ScoringWeights) -> VenueScore {
    let spread = metrics.spread_bps.max(0.0);
    let latency = metrics.latency_ms.max(0.0);
    let depth = metrics.top_depth_usd.max(0.0);
    let reliability = metrics.reliability_score.clamp(0.0, 1.0);

    let mut reasons = vec![
        ScoreReason {
            factor: ScoreFactor::Spread,
            value: spread,
            contribution: weights.spread / (1.0 + spread / weights.spread_scale_bps),
        },
        ScoreReason {
            factor: ScoreFactor::Latency,
            value: latency,
            contribution: weights.latency / (1.0 + latency / weights.latency_scale_ms),
        },
        ScoreReason {
            factor: ScoreFactor::Depth,
            value: depth,
            contribution: weights.depth * depth / (depth + weights.depth_scale_usd),
        },
        ScoreReason {
            factor: ScoreFactor::Reliability,
            value: reliability,
            contribution: weights.reliability * reliability,
        },
    ];

    if order_size_usd > 0.0 && depth < order_size_usd {
        let coverage = depth / order_size_usd;
        reasons.push(ScoreReason {
            factor: ScoreFactor::DepthShortfall,
            value: coverage,
            contribution: -weights.shortfall_penalty * (1.0 - coverage),
        });
    }

    VenueScore {
        venue: metrics.venue.clone(),
        score: reasons.iter().map(|r| r.contribution).sum(),
        reasons,
        metrics: metrics.clone(),
    }
}
