//! Smart venue router
//!
//! Filters and ranks registry scores for a routing request, computes a
//! confidence for the pick and records execution outcomes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::history::{Outcome, OutcomeLog};
use super::registry::{sort_scores, VenueRegistry};
use super::{RejectReason, Rejection, ScoreFactor, ScoreReason, VenueScore};
use crate::error::{MarketDataError, Result};
use crate::parser::VenueSymbol;

/// Confidence never drops below this for a venue that was selected
pub const MIN_CONFIDENCE: f64 = 0.1;
/// Outcomes considered for the confidence success-rate factor
pub const CONFIDENCE_WINDOW: usize = 10;
/// Outcomes considered for the recent success rate in stats
pub const STATS_WINDOW: usize = 20;

/// How quickly the caller needs the order worked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

/// A caller's routing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingContext {
    pub symbol: String,
    /// Order notional in quote currency (USD)
    pub size: f64,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub max_spread_bps: Option<f64>,
    #[serde(default)]
    pub min_depth_usd: Option<f64>,
    #[serde(default)]
    pub preferred_venues: Vec<String>,
    #[serde(default)]
    pub blacklisted_venues: Vec<String>,
}

impl RoutingContext {
    pub fn new(symbol: &str, size: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            size,
            urgency: Urgency::Medium,
            max_spread_bps: None,
            min_depth_usd: None,
            preferred_venues: Vec::new(),
            blacklisted_venues: Vec::new(),
        }
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_max_spread_bps(mut self, max: f64) -> Self {
        self.max_spread_bps = Some(max);
        self
    }

    pub fn with_min_depth_usd(mut self, min: f64) -> Self {
        self.min_depth_usd = Some(min);
        self
    }

    pub fn prefer(mut self, venue: &str) -> Self {
        self.preferred_venues.push(venue.to_string());
        self
    }

    pub fn blacklist(mut self, venue: &str) -> Self {
        self.blacklisted_venues.push(venue.to_string());
        self
    }
}

/// The router's decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSelection {
    pub venue: String,
    pub symbol: String,
    pub score: f64,
    pub reasons: Vec<ScoreReason>,
    /// Next best venues, best first
    pub fallbacks: Vec<String>,
    /// In [MIN_CONFIDENCE, 1]
    pub confidence: f64,
}

impl VenueSelection {
    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }
}

/// Operational routing statistics for one (venue, symbol)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingStats {
    pub venue: String,
    pub symbol: String,
    pub total_routed: u64,
    pub lifetime_success_rate: Option<f64>,
    pub recent_success_rate: Option<f64>,
    pub last_used: Option<DateTime<Utc>>,
}

/// Router tunables
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Rate budget below which high-urgency requests skip a venue
    pub min_rate_remaining: u32,
    /// Score added to preferred venues
    pub preferred_boost: f64,
    /// Score gap to the runner-up that maps to full separation
    pub max_score_gap: f64,
    pub max_fallbacks: usize,
    pub history_capacity: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            min_rate_remaining: 10,
            preferred_boost: 10.0,
            max_score_gap: 25.0,
            max_fallbacks: 3,
            history_capacity: 100,
        }
    }
}

/// Chooses a venue per request and learns from outcomes
pub struct SmartVenueRouter {
    registry: Arc<VenueRegistry>,
    settings: RouterSettings,
    history: DashMap<VenueSymbol, OutcomeLog>,
}

impl SmartVenueRouter {
    pub fn new(registry: Arc<VenueRegistry>, settings: RouterSettings) -> Self {
        Self {
            registry,
            settings,
            history: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<VenueRegistry> {
        &self.registry
    }

    /// Pick a primary venue and fallbacks for the request
    pub fn select_venue(&self, context: &RoutingContext) -> Result<VenueSelection> {
        let scores = self.registry.score_venues(&context.symbol, context.size);
        let (mut candidates, rejections) = self.filter_candidates(scores, context);

        if candidates.is_empty() {
            warn!(
                symbol = %context.symbol,
                rejected = rejections.len(),
                reasons = ?rejections.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "No suitable venue"
            );
            return Err(MarketDataError::NoSuitableVenue {
                symbol: context.symbol.clone(),
                rejections,
            });
        }

        for candidate in candidates.iter_mut() {
            if context.preferred_venues.contains(&candidate.venue) {
                candidate.score += self.settings.preferred_boost;
                candidate.reasons.push(ScoreReason {
                    factor: ScoreFactor::Preferred,
                    value: 1.0,
                    contribution: self.settings.preferred_boost,
                });
            }
        }
        sort_scores(&mut candidates);

        let confidence = self.confidence(&candidates, &context.symbol);
        let mut ranked = candidates.into_iter();
        let Some(best) = ranked.next() else {
            return Err(MarketDataError::NoSuitableVenue {
                symbol: context.symbol.clone(),
                rejections,
            });
        };
        let fallbacks: Vec<String> = ranked
            .take(self.settings.max_fallbacks)
            .map(|score| score.venue)
            .collect();

        let now = Utc::now();
        self.history
            .entry(VenueSymbol::new(&best.venue, &context.symbol))
            .or_insert_with(|| OutcomeLog::new(self.settings.history_capacity))
            .mark_routed(now);

        info!(
            symbol = %context.symbol,
            venue = %best.venue,
            score = best.score,
            confidence,
            fallbacks = ?fallbacks,
            "Venue selected"
        );

        Ok(VenueSelection {
            venue: best.venue,
            symbol: context.symbol.clone(),
            score: best.score,
            reasons: best.reasons,
            fallbacks,
            confidence,
        })
    }

    /// Apply the request's filters in order, keeping the first reason each venue failed
    fn filter_candidates(
        &self,
        scores: Vec<VenueScore>,
        context: &RoutingContext,
    ) -> (Vec<VenueScore>, Vec<Rejection>) {
        let mut candidates = Vec::with_capacity(scores.len());
        let mut rejections = Vec::new();

        for score in scores {
            match self.rejection_reason(&score, context) {
                Some(reason) => {
                    debug!(venue = %score.venue, reason = %reason, "Venue filtered");
                    rejections.push(Rejection {
                        venue: score.venue,
                        reason,
                    });
                }
                None => candidates.push(score),
            }
        }

        (candidates, rejections)
    }

    fn rejection_reason(&self, score: &VenueScore, context: &RoutingContext) -> Option<RejectReason> {
        let metrics = &score.metrics;

        if let Some(max_spread_bps) = context.max_spread_bps {
            if metrics.spread_bps > max_spread_bps {
                return Some(RejectReason::SpreadTooWide {
                    spread_bps: metrics.spread_bps,
                    max_spread_bps,
                });
            }
        }

        if let Some(min_depth_usd) = context.min_depth_usd {
            if metrics.top_depth_usd < min_depth_usd {
                return Some(RejectReason::InsufficientDepth {
                    depth_usd: metrics.top_depth_usd,
                    min_depth_usd,
                });
            }
        }

        if context.blacklisted_venues.contains(&score.venue) {
            return Some(RejectReason::Blacklisted);
        }

        if context.urgency == Urgency::High && metrics.rate_remaining < self.settings.min_rate_remaining {
            return Some(RejectReason::RateLimited {
                rate_remaining: metrics.rate_remaining,
                min_rate_remaining: self.settings.min_rate_remaining,
            });
        }

        None
    }

    /// Separation from the runner-up x reliability x recent success rate, clamped
    fn confidence(&self, ranked: &[VenueScore], symbol: &str) -> f64 {
        let Some(best) = ranked.first() else {
            return MIN_CONFIDENCE;
        };

        let max_gap = self.settings.max_score_gap.max(f64::EPSILON);
        let gap = ranked
            .get(1)
            .map(|runner_up| (best.score - runner_up.score).max(0.0))
            .unwrap_or(max_gap);
        let separation = (gap / max_gap).min(1.0);

        let mut confidence = separation * best.metrics.reliability_score;

        let recent = self
            .history
            .get(&VenueSymbol::new(&best.venue, symbol))
            .and_then(|log| log.recent_success_rate(CONFIDENCE_WINDOW));
        if let Some(rate) = recent {
            confidence *= rate;
        }

        if confidence.is_finite() {
            confidence.clamp(MIN_CONFIDENCE, 1.0)
        } else {
            MIN_CONFIDENCE
        }
    }

    /// Record how an order routed to `venue` went.
    ///
    /// Outcomes for pairs the registry does not know are ignored; returns
    /// whether the outcome was recorded.
    pub fn record_outcome(&self, venue: &str, symbol: &str, success: bool, latency_ms: Option<f64>) -> bool {
        if !self.registry.is_registered(venue, symbol) {
            debug!(venue = %venue, symbol = %symbol, "Outcome for unknown pair ignored");
            return false;
        }

        let outcome = Outcome {
            success,
            latency_ms,
            at: Utc::now(),
        };

        self.history
            .entry(VenueSymbol::new(venue, symbol))
            .or_insert_with(|| OutcomeLog::new(self.settings.history_capacity))
            .record(outcome);

        if let Some(latency) = latency_ms {
            self.registry.record_performance(venue, latency, success);
        }

        debug!(venue = %venue, symbol = %symbol, success, latency_ms = ?latency_ms, "Outcome recorded");
        true
    }

    /// Stats for every (venue, symbol) the router has touched, sorted by pair
    pub fn routing_stats(&self) -> Vec<RoutingStats> {
        let mut stats: Vec<RoutingStats> = self
            .history
            .iter()
            .map(|entry| {
                let log = entry.value();
                RoutingStats {
                    venue: entry.key().venue.clone(),
                    symbol: entry.key().symbol.clone(),
                    total_routed: log.routed(),
                    lifetime_success_rate: log.lifetime_success_rate(),
                    recent_success_rate: log.recent_success_rate(STATS_WINDOW),
                    last_used: log.last_used(),
                }
            })
            .collect();
        stats.sort_by(|a, b| (&a.venue, &a.symbol).cmp(&(&b.venue, &b.symbol)));
        stats
    }

    /// Recorded outcomes for a pair, oldest first
    pub fn routing_history(&self, venue: &str, symbol: &str) -> Vec<Outcome> {
        self.history
            .get(&VenueSymbol::new(venue, symbol))
            .map(|log| log.outcomes().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::VenueMetricsUpdate;

    fn add(registry: &VenueRegistry, venue: &str, spread: f64, depth: f64, reliability: f64, rate: u32) {
        registry.update_venue_metric(
            venue,
            "BTCUSDT",
            VenueMetricsUpdate {
                spread_bps: Some(spread),
                top_depth_usd: Some(depth),
                latency_ms: Some(50.0),
                reliability_score: Some(reliability),
                rate_remaining: Some(rate),
            },
        );
    }

    fn router() -> SmartVenueRouter {
        let registry = Arc::new(VenueRegistry::default());
        add(&registry, "binance", 2.0, 2_000_000.0, 0.95, 500);
        add(&registry, "coinbase", 4.0, 1_500_000.0, 0.9, 500);
        add(&registry, "kraken", 8.0, 800_000.0, 0.9, 5);
        add(&registry, "bitstamp", 25.0, 200_000.0, 0.8, 500);
        add(&registry, "gemini", 30.0, 100_000.0, 0.7, 500);
        SmartVenueRouter::new(registry, RouterSettings::default())
    }

    #[test]
    fn test_selects_best_with_fallbacks() {
        let router = router();
        let selection = router.select_venue(&RoutingContext::new("BTCUSDT", 10_000.0)).unwrap();

        assert_eq!(selection.venue, "binance");
        assert_eq!(selection.fallbacks, vec!["coinbase", "kraken", "bitstamp"]);
        assert!(selection.reasons.iter().any(|r| r.factor == ScoreFactor::Spread));
        assert!(selection.confidence >= MIN_CONFIDENCE && selection.confidence <= 1.0);
    }

    #[test]
    fn test_filters_apply_in_order() {
        let router = router();
        let context = RoutingContext::new("BTCUSDT", 10_000.0)
            .with_max_spread_bps(20.0)
            .with_min_depth_usd(1_000_000.0)
            .blacklist("binance")
            .blacklist("bitstamp");

        let selection = router.select_venue(&context).unwrap();
        assert_eq!(selection.venue, "coinbase");
        assert!(selection.fallbacks.is_empty());
    }

    #[test]
    fn test_high_urgency_drops_rate_limited_venues() {
        let router = router();
        let context = RoutingContext::new("BTCUSDT", 10_000.0)
            .with_urgency(Urgency::High)
            .with_max_spread_bps(10.0);

        let selection = router.select_venue(&context).unwrap();
        assert_eq!(selection.fallbacks, vec!["coinbase"]);

        let relaxed = RoutingContext::new("BTCUSDT", 10_000.0).with_max_spread_bps(10.0);
        assert_eq!(router.select_venue(&relaxed).unwrap().fallbacks, vec!["coinbase", "kraken"]);
    }

    #[test]
    fn test_preferred_venue_boost_reorders() {
        let router = router();
        let context = RoutingContext::new("BTCUSDT", 10_000.0).prefer("coinbase");

        let selection = router.select_venue(&context).unwrap();
        assert_eq!(selection.venue, "coinbase");
        assert_eq!(selection.fallbacks[0], "binance");
        assert!(selection.reasons.iter().any(|r| r.factor == ScoreFactor::Preferred));
    }

    #[test]
    fn test_no_suitable_venue_reports_rejections() {
        let router = router();
        let context = RoutingContext::new("BTCUSDT", 10_000.0).with_max_spread_bps(0.5);

        match router.select_venue(&context) {
            Err(MarketDataError::NoSuitableVenue { symbol, rejections }) => {
                assert_eq!(symbol, "BTCUSDT");
                assert_eq!(rejections.len(), 5);
                assert!(rejections
                    .iter()
                    .all(|r| matches!(r.reason, RejectReason::SpreadTooWide { .. })));
            }
            other => panic!("expected NoSuitableVenue, got {:?}", other),
        }
        assert!(router.routing_stats().is_empty());
    }

    #[test]
    fn test_unknown_symbol_has_no_venue() {
        let router = router();
        assert!(matches!(
            router.select_venue(&RoutingContext::new("DOGEUSDT", 1.0)),
            Err(MarketDataError::NoSuitableVenue { .. })
        ));
    }

    #[test]
    fn test_single_candidate_confidence_is_reliability() {
        let router = router();
        let context = RoutingContext::new("BTCUSDT", 10_000.0).with_max_spread_bps(3.0);
        let selection = router.select_venue(&context).unwrap();
        assert!((selection.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_failures_reduce_confidence_to_floor() {
        let router = router();
        let context = RoutingContext::new("BTCUSDT", 10_000.0).with_max_spread_bps(3.0);

        for _ in 0..10 {
            router.record_outcome("binance", "BTCUSDT", false, None);
        }
        let selection = router.select_venue(&context).unwrap();
        assert_eq!(selection.confidence, MIN_CONFIDENCE);
    }

    #[test]
    fn test_outcomes_feed_registry_and_stats() {
        let router = router();
        router.select_venue(&RoutingContext::new("BTCUSDT", 10_000.0)).unwrap();
        router.record_outcome("binance", "BTCUSDT", true, Some(20.0));
        router.record_outcome("binance", "BTCUSDT", false, None);

        let metrics = &router.registry().get_metrics(Some("binance"), None)[0];
        assert!(metrics.reliability_score > 0.95);
        assert!(metrics.latency_ms < 50.0);

        let stats = router.routing_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_routed, 1);
        assert_eq!(stats[0].lifetime_success_rate, Some(0.5));
        assert_eq!(stats[0].recent_success_rate, Some(0.5));
        assert!(stats[0].last_used.is_some());
        assert_eq!(router.routing_history("binance", "BTCUSDT").len(), 2);
    }

    #[test]
    fn test_outcomes_for_unknown_pairs_are_ignored() {
        let router = router();
        for i in 0..50 {
            assert!(!router.record_outcome(&format!("ghost{}", i), "BTCUSDT", true, Some(1.0)));
        }
        assert!(!router.record_outcome("binance", "DOGEUSDT", true, None));

        assert!(router.routing_stats().is_empty());
        assert!(router.routing_history("ghost0", "BTCUSDT").is_empty());
        assert!(router.registry().get_metrics(Some("ghost0"), None).is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let registry = Arc::new(VenueRegistry::default());
        registry.register_venue("binance", "BTCUSDT");
        let router = SmartVenueRouter::new(
            registry,
            RouterSettings {
                history_capacity: 5,
                ..RouterSettings::default()
            },
        );
        for _ in 0..12 {
            router.record_outcome("binance", "BTCUSDT", true, None);
        }
        assert_eq!(router.routing_history("binance", "BTCUSDT").len(), 5);
    }
}
