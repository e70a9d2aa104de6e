//! Feeds maintained book aggregates into the venue registry

use tracing::debug;

use super::{VenueMetricsUpdate, VenueRegistry};
use crate::orderbook::BookMaintainer;

/// Push spread and top-of-book depth from every maintained book into the registry.
///
/// Stale or one-sided books do not update metrics; stale ones have their
/// reliability nudged down instead. Returns the number of pairs updated.
pub fn sync_from_books(maintainer: &BookMaintainer, registry: &VenueRegistry) -> usize {
    let mut updated = 0;

    for pair in maintainer.maintained_pairs() {
        let Ok(aggregates) = maintainer.get_aggregates(&pair.venue, &pair.symbol) else {
            continue;
        };

        if aggregates.stale {
            registry.penalize_stale(&pair.venue, &pair.symbol);
            continue;
        }
        if !aggregates.is_two_sided() {
            debug!(pair = %pair, "Book one-sided, metrics left unchanged");
            continue;
        }

        registry.update_venue_metric(
            &pair.venue,
            &pair.symbol,
            VenueMetricsUpdate {
                spread_bps: Some(aggregates.spread_bps_f64()),
                top_depth_usd: Some(aggregates.depth_notional_f64()),
                ..Default::default()
            },
        );
        updated += 1;
    }

    updated
}
