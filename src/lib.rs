//! ORPflow venue router - order book maintenance and smart venue selection
//!
//! Keeps sequence-consistent depth books per (venue, symbol) built from a
//! snapshot plus incremental deltas, and routes orders to the venue with the
//! best live market quality.

pub mod backoff;
pub mod config;
pub mod error;
pub mod feed;
pub mod orderbook;
pub mod parser;
pub mod server;
pub mod telemetry;
pub mod venue;

pub use config::Config;
pub use error::{MarketDataError, Result};
pub use feed::{BookFeedAdapter, FixtureFeed, NetworkFeed};
pub use orderbook::{BookAggregates, BookHealth, BookMaintainer, BookStatus, BookView, DeltaOutcome, DepthBook, MaintainerSettings};
pub use parser::{DepthLevel, LevelUpdate, OrderBookDelta, OrderBookSnapshot, UpdateAction, VenueSymbol};
pub use server::AppState;
pub use telemetry::Telemetry;
pub use venue::{RoutingContext, SmartVenueRouter, Urgency, VenueMetrics, VenueRegistry, VenueSelection};
