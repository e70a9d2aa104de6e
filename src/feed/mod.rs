//! Book feed adapters
//!
//! The maintainer consumes snapshots and delta streams through
//! [`BookFeedAdapter`]. Venue-specific wire handling lives behind it.

mod fixture;
mod network;

pub use fixture::FixtureFeed;
pub use network::NetworkFeed;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::parser::{OrderBookDelta, OrderBookSnapshot};

/// Ordered stream of deltas for one (venue, symbol).
///
/// An `Err` item is a malformed message; the end of the stream is a disconnect.
pub type DeltaStream = BoxStream<'static, Result<OrderBookDelta>>;

/// Source of snapshots and deltas for the book maintainer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookFeedAdapter: Send + Sync {
    /// Pull a full, authoritative snapshot
    async fn fetch_snapshot(&self, venue: &str, symbol: &str) -> Result<OrderBookSnapshot>;

    /// Open the push stream of deltas
    async fn subscribe(&self, venue: &str, symbol: &str) -> Result<DeltaStream>;
}
