//! Deterministic in-memory feed
//!
//! Serves pre-loaded snapshots and lets the caller push deltas, malformed
//! messages and disconnects into the live subscription.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;

use super::{BookFeedAdapter, DeltaStream};
use crate::error::{MarketDataError, Result};
use crate::parser::{OrderBookDelta, OrderBookSnapshot, VenueSymbol};

type DeltaSender = mpsc::UnboundedSender<Result<OrderBookDelta>>;

#[derive(Default)]
struct FixturePair {
    /// Served in order; the last one is repeated
    snapshots: VecDeque<OrderBookSnapshot>,
    failures_remaining: u32,
    fetches: u32,
    subscriptions: u32,
    sender: Option<DeltaSender>,
}

/// Feed adapter backed by fixtures instead of a network
#[derive(Default)]
pub struct FixtureFeed {
    pairs: Mutex<HashMap<VenueSymbol, FixturePair>>,
}

impl FixtureFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a snapshot for its (venue, symbol)
    pub fn push_snapshot(&self, snapshot: OrderBookSnapshot) {
        let key = VenueSymbol::new(&snapshot.venue, &snapshot.symbol);
        self.pairs
            .lock()
            .entry(key)
            .or_default()
            .snapshots
            .push_back(snapshot);
    }

    /// Make the next `count` snapshot fetches fail
    pub fn fail_fetches(&self, venue: &str, symbol: &str, count: u32) {
        self.pairs
            .lock()
            .entry(VenueSymbol::new(venue, symbol))
            .or_default()
            .failures_remaining = count;
    }

    /// Push a delta into the live subscription. Returns false if none is open.
    pub fn send_delta(&self, delta: OrderBookDelta) -> bool {
        let key = delta.key();
        self.send(&key, Ok(delta))
    }

    /// Push a malformed message into the live subscription
    pub fn send_malformed(&self, venue: &str, symbol: &str, reason: &str) -> bool {
        self.send(
            &VenueSymbol::new(venue, symbol),
            Err(MarketDataError::ParseError(reason.to_string())),
        )
    }

    /// Close the live subscription
    pub fn disconnect(&self, venue: &str, symbol: &str) -> bool {
        self.pairs
            .lock()
            .get_mut(&VenueSymbol::new(venue, symbol))
            .and_then(|pair| pair.sender.take())
            .is_some()
    }

    pub fn fetch_count(&self, venue: &str, symbol: &str) -> u32 {
        self.pairs
            .lock()
            .get(&VenueSymbol::new(venue, symbol))
            .map(|pair| pair.fetches)
            .unwrap_or(0)
    }

    pub fn subscription_count(&self, venue: &str, symbol: &str) -> u32 {
        self.pairs
            .lock()
            .get(&VenueSymbol::new(venue, symbol))
            .map(|pair| pair.subscriptions)
            .unwrap_or(0)
    }

    /// Whether the current subscription's receiver is still alive
    pub fn is_subscribed(&self, venue: &str, symbol: &str) -> bool {
        self.pairs
            .lock()
            .get(&VenueSymbol::new(venue, symbol))
            .and_then(|pair| pair.sender.as_ref())
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    fn send(&self, key: &VenueSymbol, item: Result<OrderBookDelta>) -> bool {
        self.pairs
            .lock()
            .get(key)
            .and_then(|pair| pair.sender.as_ref())
            .map(|sender| sender.send(item).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl BookFeedAdapter for FixtureFeed {
    async fn fetch_snapshot(&self, venue: &str, symbol: &str) -> Result<OrderBookSnapshot> {
        let mut pairs = self.pairs.lock();
        let pair = pairs.entry(VenueSymbol::new(venue, symbol)).or_default();
        pair.fetches += 1;

        if pair.failures_remaining > 0 {
            pair.failures_remaining -= 1;
            return Err(MarketDataError::SnapshotFetch {
                venue: venue.to_string(),
                symbol: symbol.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let snapshot = if pair.snapshots.len() > 1 {
            pair.snapshots.pop_front()
        } else {
            pair.snapshots.front().cloned()
        };

        snapshot.ok_or_else(|| MarketDataError::SnapshotFetch {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            reason: "no snapshot loaded".to_string(),
        })
    }

    async fn subscribe(&self, venue: &str, symbol: &str) -> Result<DeltaStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut pairs = self.pairs.lock();
            let pair = pairs.entry(VenueSymbol::new(venue, symbol)).or_default();
            pair.subscriptions += 1;
            // Replacing the sender ends any previous subscription's stream
            pair.sender = Some(tx);
        }

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::parser::{DepthLevel, LevelUpdate};

    fn snapshot(seq: u64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            seq,
            bids: vec![DepthLevel::new(dec!(100), dec!(1))],
            asks: vec![DepthLevel::new(dec!(101), dec!(1))],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_snapshots_served_in_order_and_last_repeated() {
        let feed = FixtureFeed::new();
        feed.push_snapshot(snapshot(1));
        feed.push_snapshot(snapshot(2));

        assert_eq!(feed.fetch_snapshot("binance", "BTCUSDT").await.unwrap().seq, 1);
        assert_eq!(feed.fetch_snapshot("binance", "BTCUSDT").await.unwrap().seq, 2);
        assert_eq!(feed.fetch_snapshot("binance", "BTCUSDT").await.unwrap().seq, 2);
        assert_eq!(feed.fetch_count("binance", "BTCUSDT"), 3);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let feed = FixtureFeed::new();
        feed.push_snapshot(snapshot(1));
        feed.fail_fetches("binance", "BTCUSDT", 2);

        assert!(feed.fetch_snapshot("binance", "BTCUSDT").await.is_err());
        assert!(feed.fetch_snapshot("binance", "BTCUSDT").await.is_err());
        assert!(feed.fetch_snapshot("binance", "BTCUSDT").await.is_ok());
        assert!(feed.fetch_snapshot("kraken", "BTCUSDT").await.is_err());
    }

    #[tokio::test]
    async fn test_stream_delivers_and_ends_on_disconnect() {
        let feed = FixtureFeed::new();
        let mut stream = feed.subscribe("binance", "BTCUSDT").await.unwrap();

        let delta = OrderBookDelta {
            venue: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            seq: 2,
            bid_updates: vec![LevelUpdate::delete(dec!(100))],
            ask_updates: vec![],
            timestamp: Utc::now(),
        };
        assert!(feed.send_delta(delta));
        assert!(feed.send_malformed("binance", "BTCUSDT", "bad frame"));

        assert_eq!(stream.next().await.unwrap().unwrap().seq, 2);
        assert!(stream.next().await.unwrap().is_err());

        assert!(feed.disconnect("binance", "BTCUSDT"));
        assert!(stream.next().await.is_none());
        assert!(!feed.is_subscribed("binance", "BTCUSDT"));
    }
}
