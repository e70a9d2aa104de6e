//! Venue registry
//!
//! Per-(venue, symbol) metrics behind a sharded map, so concurrent updates
//! to different entries never contend on one lock.

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::scoring::{score_venue, ScoringWeights};
use super::{VenueMetrics, VenueMetricsUpdate, VenueScore};
use crate::parser::VenueSymbol;

/// Weight of the newest sample in reliability and latency averages
pub const DEFAULT_EWMA_ALPHA: f64 = 0.1;

/// Live venue metrics and scoring
pub struct VenueRegistry {
    entries: DashMap<VenueSymbol, VenueMetrics>,
    weights: ScoringWeights,
    ewma_alpha: f64,
}

impl Default for VenueRegistry {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}

impl VenueRegistry {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            entries: DashMap::new(),
            weights,
            ewma_alpha: DEFAULT_EWMA_ALPHA,
        }
    }

    pub fn with_ewma_alpha(mut self, alpha: f64) -> Self {
        self.ewma_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Register a venue with default metrics. Returns false if already known.
    pub fn register_venue(&self, venue: &str, symbol: &str) -> bool {
        let key = VenueSymbol::new(venue, symbol);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries
            .entry(key)
            .or_insert_with(|| VenueMetrics::new(venue, symbol));
        debug!(venue = %venue, symbol = %symbol, "Venue registered");
        true
    }

    pub fn is_registered(&self, venue: &str, symbol: &str) -> bool {
        self.entries.contains_key(&VenueSymbol::new(venue, symbol))
    }

    /// Remove every entry for a venue. Returns the number removed.
    pub fn remove_venue(&self, venue: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.venue != venue);
        before - self.entries.len()
    }

    /// Merge the given fields into the stored metrics, registering the pair first if needed
    pub fn update_venue_metric(&self, venue: &str, symbol: &str, update: VenueMetricsUpdate) {
        let mut entry = self
            .entries
            .entry(VenueSymbol::new(venue, symbol))
            .or_insert_with(|| VenueMetrics::new(venue, symbol));
        let metrics = entry.value_mut();

        if let Some(spread) = sanitize(venue, "spread_bps", update.spread_bps) {
            metrics.spread_bps = spread.max(0.0);
        }
        if let Some(depth) = sanitize(venue, "top_depth_usd", update.top_depth_usd) {
            metrics.top_depth_usd = depth.max(0.0);
        }
        if let Some(latency) = sanitize(venue, "latency_ms", update.latency_ms) {
            metrics.latency_ms = latency.max(0.0);
        }
        if let Some(reliability) = sanitize(venue, "reliability_score", update.reliability_score) {
            metrics.reliability_score = reliability.clamp(0.0, 1.0);
        }
        if let Some(rate) = update.rate_remaining {
            metrics.rate_remaining = rate;
        }
        metrics.last_update = Utc::now();
    }

    /// Metrics filtered by venue and/or symbol, sorted by pair
    pub fn get_metrics(&self, venue: Option<&str>, symbol: Option<&str>) -> Vec<VenueMetrics> {
        let mut metrics: Vec<VenueMetrics> = self
            .entries
            .iter()
            .filter(|entry| venue.map_or(true, |v| entry.key().venue == v))
            .filter(|entry| symbol.map_or(true, |s| entry.key().symbol == s))
            .map(|entry| entry.value().clone())
            .collect();
        metrics.sort_by(|a, b| (&a.venue, &a.symbol).cmp(&(&b.venue, &b.symbol)));
        metrics
    }

    /// Score every venue quoting `symbol` for an order of `size` notional, best first
    pub fn score_venues(&self, symbol: &str, size: f64) -> Vec<VenueScore> {
        let mut scores: Vec<VenueScore> = self
            .get_metrics(None, Some(symbol))
            .iter()
            .map(|metrics| score_venue(metrics, size, &self.weights))
            .collect();
        sort_scores(&mut scores);
        scores
    }

    /// Fold an observed execution into every entry of `venue`.
    ///
    /// Returns the number of entries updated.
    pub fn record_performance(&self, venue: &str, observed_latency_ms: f64, success: bool) -> usize {
        let alpha = self.ewma_alpha;
        let sample = if success { 1.0 } else { 0.0 };
        let latency = sanitize(venue, "observed_latency_ms", Some(observed_latency_ms));

        let mut updated = 0;
        for mut entry in self.entries.iter_mut().filter(|e| e.key().venue == venue) {
            let metrics = entry.value_mut();
            metrics.reliability_score =
                ewma(metrics.reliability_score, sample, alpha).clamp(0.0, 1.0);
            if let Some(latency) = latency {
                metrics.latency_ms = ewma(metrics.latency_ms, latency.max(0.0), alpha);
            }
            metrics.last_update = Utc::now();
            updated += 1;
        }

        if updated == 0 {
            debug!(venue = %venue, "Performance recorded for unknown venue, ignored");
        }
        updated
    }

    /// Nudge reliability down for a pair whose book is not synced
    pub fn penalize_stale(&self, venue: &str, symbol: &str) {
        if let Some(mut entry) = self.entries.get_mut(&VenueSymbol::new(venue, symbol)) {
            let metrics = entry.value_mut();
            metrics.reliability_score = ewma(metrics.reliability_score, 0.0, self.ewma_alpha);
        }
    }
}

/// Descending by score, ties broken by venue name
pub(crate) fn sort_scores(scores: &mut [VenueScore]) {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.venue.cmp(&b.venue)));
}

fn ewma(current: f64, sample: f64, alpha: f64) -> f64 {
    current * (1.0 - alpha) + sample * alpha
}

fn sanitize(venue: &str, field: &str, value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() => Some(v),
        Some(v) => {
            warn!(venue = %venue, field, value = v, "Ignoring non-finite metric");
            None
        }
        None => None,
    }
}
