//! Prometheus gauges for venue metrics and book health

use prometheus::{Encoder, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{MarketDataError, Result};
use crate::orderbook::{BookHealth, BookStatus};
use crate::venue::VenueMetrics;

const PAIR_LABELS: &[&str] = &["venue", "symbol"];

/// Gauges registered on a registry owned by this struct
pub struct Telemetry {
    registry: Registry,

    venue_spread_bps: GaugeVec,
    venue_top_depth_usd: GaugeVec,
    venue_latency_ms: GaugeVec,
    venue_reliability_score: GaugeVec,
    venue_rate_remaining: IntGaugeVec,

    book_sequence: IntGaugeVec,
    book_staleness_seconds: GaugeVec,
    book_synced: IntGaugeVec,
    book_gaps_total: IntGaugeVec,
    book_resyncs_total: IntGaugeVec,
    book_snapshot_failures: IntGaugeVec,

    maintainer_healthy: IntGauge,
}

impl Telemetry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let telemetry = Self {
            venue_spread_bps: gauge_vec("venue_spread_bps", "Quoted spread in basis points")?,
            venue_top_depth_usd: gauge_vec(
                "venue_top_depth_usd",
                "Notional resting near the top of book in USD",
            )?,
            venue_latency_ms: gauge_vec("venue_latency_ms", "Smoothed execution latency in ms")?,
            venue_reliability_score: gauge_vec(
                "venue_reliability_score",
                "Smoothed execution success rate (0-1)",
            )?,
            venue_rate_remaining: int_gauge_vec(
                "venue_rate_remaining",
                "Remaining venue request budget",
            )?,
            book_sequence: int_gauge_vec("book_sequence", "Last applied sequence number")?,
            book_staleness_seconds: gauge_vec(
                "book_staleness_seconds",
                "Seconds since the last applied update",
            )?,
            book_synced: int_gauge_vec("book_synced", "1 if the book is synced, 0 otherwise")?,
            book_gaps_total: int_gauge_vec("book_gaps_total", "Sequence gaps detected")?,
            book_resyncs_total: int_gauge_vec("book_resyncs_total", "Resyncs fired")?,
            book_snapshot_failures: int_gauge_vec(
                "book_snapshot_failures",
                "Consecutive snapshot fetch failures",
            )?,
            maintainer_healthy: IntGauge::new(
                "maintainer_healthy",
                "1 if every maintained book is healthy",
            )?,
            registry,
        };

        telemetry.register()?;
        Ok(telemetry)
    }

    fn register(&self) -> Result<()> {
        let registry = &self.registry;
        registry.register(Box::new(self.venue_spread_bps.clone()))?;
        registry.register(Box::new(self.venue_top_depth_usd.clone()))?;
        registry.register(Box::new(self.venue_latency_ms.clone()))?;
        registry.register(Box::new(self.venue_reliability_score.clone()))?;
        registry.register(Box::new(self.venue_rate_remaining.clone()))?;
        registry.register(Box::new(self.book_sequence.clone()))?;
        registry.register(Box::new(self.book_staleness_seconds.clone()))?;
        registry.register(Box::new(self.book_synced.clone()))?;
        registry.register(Box::new(self.book_gaps_total.clone()))?;
        registry.register(Box::new(self.book_resyncs_total.clone()))?;
        registry.register(Box::new(self.book_snapshot_failures.clone()))?;
        registry.register(Box::new(self.maintainer_healthy.clone()))?;
        Ok(())
    }

    /// Export the current venue metrics, dropping series for pairs no longer present
    pub fn observe_venues(&self, metrics: &[VenueMetrics]) {
        self.venue_spread_bps.reset();
        self.venue_top_depth_usd.reset();
        self.venue_latency_ms.reset();
        self.venue_reliability_score.reset();
        self.venue_rate_remaining.reset();

        for m in metrics {
            let labels = [m.venue.as_str(), m.symbol.as_str()];
            self.venue_spread_bps.with_label_values(&labels).set(m.spread_bps);
            self.venue_top_depth_usd
                .with_label_values(&labels)
                .set(m.top_depth_usd);
            self.venue_latency_ms.with_label_values(&labels).set(m.latency_ms);
            self.venue_reliability_score
                .with_label_values(&labels)
                .set(m.reliability_score);
            self.venue_rate_remaining
                .with_label_values(&labels)
                .set(i64::from(m.rate_remaining));
        }
    }

    /// Export per-book health and the aggregate health flag, dropping
    /// series for books no longer maintained
    pub fn observe_books(&self, health: &[BookHealth]) {
        self.book_sequence.reset();
        self.book_staleness_seconds.reset();
        self.book_synced.reset();
        self.book_gaps_total.reset();
        self.book_resyncs_total.reset();
        self.book_snapshot_failures.reset();

        for h in health {
            let labels = [h.venue.as_str(), h.symbol.as_str()];
            self.book_sequence
                .with_label_values(&labels)
                .set(i64::try_from(h.seq).unwrap_or(i64::MAX));
            if let Some(staleness) = h.staleness_secs {
                self.book_staleness_seconds
                    .with_label_values(&labels)
                    .set(staleness);
            }
            self.book_synced
                .with_label_values(&labels)
                .set(i64::from(h.status == BookStatus::Synced));
            self.book_gaps_total
                .with_label_values(&labels)
                .set(i64::try_from(h.gaps).unwrap_or(i64::MAX));
            self.book_resyncs_total
                .with_label_values(&labels)
                .set(i64::try_from(h.resyncs).unwrap_or(i64::MAX));
            self.book_snapshot_failures
                .with_label_values(&labels)
                .set(i64::from(h.consecutive_failures));
        }
        self.maintainer_healthy
            .set(i64::from(health.iter().all(|h| h.healthy)));
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MarketDataError::Telemetry(e.to_string()))
    }
}

fn gauge_vec(name: &str, help: &str) -> Result<GaugeVec> {
    Ok(GaugeVec::new(Opts::new(name, help), PAIR_LABELS)?)
}

fn int_gauge_vec(name: &str, help: &str) -> Result<IntGaugeVec> {
    Ok(IntGaugeVec::new(Opts::new(name, help), PAIR_LABELS)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(healthy: bool) -> BookHealth {
        BookHealth {
            venue: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            status: BookStatus::Synced,
            seq: 42,
            staleness_secs: Some(1.5),
            gaps: 2,
            resyncs: 1,
            consecutive_failures: 0,
            resync_pending: false,
            last_issue: None,
            healthy,
        }
    }

    #[test]
    fn test_encode_contains_observed_series() {
        let telemetry = Telemetry::new().unwrap();
        let mut metrics = VenueMetrics::new("binance", "BTCUSDT");
        metrics.spread_bps = 2.5;
        telemetry.observe_venues(&[metrics]);
        telemetry.observe_books(&[health(true)]);

        let text = telemetry.encode().unwrap();
        assert!(text.contains("venue_spread_bps{symbol=\"BTCUSDT\",venue=\"binance\"} 2.5"));
        assert!(text.contains("book_sequence{symbol=\"BTCUSDT\",venue=\"binance\"} 42"));
        assert!(text.contains("book_gaps_total{symbol=\"BTCUSDT\",venue=\"binance\"} 2"));
        assert!(text.contains("maintainer_healthy 1"));
    }

    #[test]
    fn test_removed_pairs_stop_being_exported() {
        let telemetry = Telemetry::new().unwrap();
        telemetry.observe_venues(&[
            VenueMetrics::new("binance", "BTCUSDT"),
            VenueMetrics::new("kraken", "ETHUSDT"),
        ]);
        telemetry.observe_books(&[health(true)]);

        telemetry.observe_venues(&[VenueMetrics::new("binance", "BTCUSDT")]);
        telemetry.observe_books(&[]);

        let text = telemetry.encode().unwrap();
        assert!(!text.contains("kraken"));
        assert!(text.contains("venue_latency_ms{symbol=\"BTCUSDT\",venue=\"binance\"}"));
        assert!(!text.contains("book_sequence{"));
    }

    #[test]
    fn test_unhealthy_book_clears_flag() {
        let telemetry = Telemetry::new().unwrap();
        telemetry.observe_books(&[health(true), health(false)]);
        assert!(telemetry.encode().unwrap().contains("maintainer_healthy 0"));
    }

    #[test]
    fn test_instances_do_not_share_registries() {
        let a = Telemetry::new().unwrap();
        let b = Telemetry::new().unwrap();
        a.observe_venues(&[VenueMetrics::new("kraken", "ETHUSDT")]);
        assert!(!b.encode().unwrap().contains("kraken"));
    }
}
