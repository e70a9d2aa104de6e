//! Core depth book implementation
//!
//! Uses BTreeMap for efficient sorted price level management.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{BookAggregates, BookStatus, BookView, Side};
use crate::parser::{DepthLevel, LevelUpdate, OrderBookDelta, OrderBookSnapshot};

/// Result of offering a delta to a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// seq was exactly current + 1 and the delta was applied
    Applied,
    /// seq <= current; duplicate or retransmission, ignored
    Stale,
    /// seq > current + 1; one or more deltas missing
    Gap { expected: u64, got: u64 },
    /// No snapshot has been applied yet
    Uninitialized,
}

/// Depth book for a single (venue, symbol)
#[derive(Debug)]
pub struct DepthBook {
    venue: String,
    symbol: String,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Sequence number of the last applied snapshot or delta
    seq: u64,
    /// Whether the book has been initialized with a snapshot
    initialized: bool,
    /// Feed timestamp of the last applied snapshot or delta
    last_update: Option<DateTime<Utc>>,
}

impl DepthBook {
    /// Create a new empty book
    pub fn new(venue: &str, symbol: &str) -> Self {
        Self {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            seq: 0,
            initialized: false,
            last_update: None,
        }
    }

    /// Replace the whole book with a snapshot, regardless of current seq
    pub fn apply_snapshot(&mut self, snapshot: &OrderBookSnapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in &snapshot.bids {
            if level.size > Decimal::ZERO {
                self.bids.insert(Reverse(level.price), level.size);
            }
        }

        for level in &snapshot.asks {
            if level.size > Decimal::ZERO {
                self.asks.insert(level.price, level.size);
            }
        }

        self.seq = snapshot.seq;
        self.last_update = Some(snapshot.timestamp);
        self.initialized = true;
    }

    /// Apply a delta if it is the next in sequence
    ///
    /// State is untouched unless the outcome is `Applied`.
    pub fn try_apply_delta(&mut self, delta: &OrderBookDelta) -> DeltaOutcome {
        if !self.initialized {
            return DeltaOutcome::Uninitialized;
        }

        if delta.seq <= self.seq {
            return DeltaOutcome::Stale;
        }

        let expected = self.seq + 1;
        if delta.seq > expected {
            return DeltaOutcome::Gap {
                expected,
                got: delta.seq,
            };
        }

        for update in &delta.bid_updates {
            self.update_side(Side::Bid, update);
        }

        for update in &delta.ask_updates {
            self.update_side(Side::Ask, update);
        }

        self.seq = delta.seq;
        self.last_update = Some(delta.timestamp);

        DeltaOutcome::Applied
    }

    /// Apply a delta, returning true only when it was applied
    pub fn apply_delta(&mut self, delta: &OrderBookDelta) -> bool {
        self.try_apply_delta(delta) == DeltaOutcome::Applied
    }

    /// Update a single price level
    fn update_side(&mut self, side: Side, update: &LevelUpdate) {
        match side {
            Side::Bid => {
                if update.removes_level() {
                    self.bids.remove(&Reverse(update.price));
                } else {
                    self.bids.insert(Reverse(update.price), update.size);
                }
            }
            Side::Ask => {
                if update.removes_level() {
                    self.asks.remove(&update.price);
                } else {
                    self.asks.insert(update.price, update.size);
                }
            }
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.checked_add(ask)?.checked_div(Decimal::TWO),
            _ => None,
        }
    }

    /// Spread in basis points, zero when either side is empty
    pub fn spread_bps(&self) -> Decimal {
        match (self.best_bid(), self.best_ask(), self.mid_price()) {
            (Some(bid), Some(ask), Some(mid)) if mid > Decimal::ZERO => ask
                .checked_sub(bid)
                .and_then(|spread| spread.checked_div(mid))
                .and_then(|ratio| ratio.checked_mul(Decimal::from(10000)))
                .unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        }
    }

    /// Top-k bids (descending) and top-k asks (ascending)
    pub fn top_levels(&self, k: usize) -> (Vec<DepthLevel>, Vec<DepthLevel>) {
        let bids = self
            .bids
            .iter()
            .take(k)
            .map(|(Reverse(p), s)| DepthLevel::new(*p, *s))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(k)
            .map(|(p, s)| DepthLevel::new(*p, *s))
            .collect();
        (bids, asks)
    }

    /// Notional resting within `pct` (0.01 = 1%) of the mid on both sides.
    ///
    /// Zero when one-sided or when the notional is not representable.
    pub fn depth_within_percent(&self, pct: Decimal) -> Decimal {
        self.checked_depth_within_percent(pct).unwrap_or(Decimal::ZERO)
    }

    fn checked_depth_within_percent(&self, pct: Decimal) -> Option<Decimal> {
        let mid = self.mid_price()?;
        let bid_floor = mid.checked_mul(Decimal::ONE.checked_sub(pct)?)?;
        let ask_ceiling = mid.checked_mul(Decimal::ONE.checked_add(pct)?)?;

        let bid_notional = checked_notional(
            self.bids
                .iter()
                .take_while(|(Reverse(p), _)| *p >= bid_floor)
                .map(|(Reverse(p), s)| (*p, *s)),
        )?;
        let ask_notional = checked_notional(
            self.asks
                .iter()
                .take_while(|(p, _)| **p <= ask_ceiling)
                .map(|(p, s)| (*p, *s)),
        )?;

        bid_notional.checked_add(ask_notional)
    }

    /// Calculate order book imbalance at top N levels
    pub fn imbalance(&self, levels: usize) -> Option<Decimal> {
        let bid_volume = checked_volume(self.bids.values().take(levels))?;
        let ask_volume = checked_volume(self.asks.values().take(levels))?;

        let total = bid_volume.checked_add(ask_volume)?;
        if total > Decimal::ZERO {
            bid_volume.checked_sub(ask_volume)?.checked_div(total)
        } else {
            None
        }
    }

    /// Whether the last update is older than `stale_threshold`
    pub fn needs_resync(&self, stale_threshold: Duration, now: DateTime<Utc>) -> bool {
        match self.last_update {
            Some(last) => now - last > stale_threshold,
            None => true,
        }
    }

    /// Check if the book is initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// Derived spread, depth and imbalance values
    pub fn aggregates(&self, band_pct: Decimal) -> BookAggregates {
        BookAggregates {
            venue: self.venue.clone(),
            symbol: self.symbol.clone(),
            mid_price: self.mid_price(),
            spread_bps: self.spread_bps(),
            imbalance: self.imbalance(5),
            bid_depth: saturating_volume(self.bids.values()),
            ask_depth: saturating_volume(self.asks.values()),
            depth_notional: self.depth_within_percent(band_pct),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
            seq: self.seq,
            stale: false,
        }
    }

    /// Top-k view of the book
    pub fn view(&self, k: usize, status: BookStatus) -> BookView {
        let (bids, asks) = self.top_levels(k);
        BookView {
            venue: self.venue.clone(),
            symbol: self.symbol.clone(),
            bids,
            asks,
            seq: self.seq,
            timestamp: self.last_update,
            spread_bps: self.spread_bps(),
            mid_price: self.mid_price(),
            status,
            stale: status != BookStatus::Synced,
        }
    }
}

/// Sum of price x size, `None` on overflow
fn checked_notional(mut levels: impl Iterator<Item = (Decimal, Decimal)>) -> Option<Decimal> {
    levels.try_fold(Decimal::ZERO, |acc, (price, size)| {
        acc.checked_add(price.checked_mul(size)?)
    })
}

fn checked_volume<'a>(mut sizes: impl Iterator<Item = &'a Decimal>) -> Option<Decimal> {
    sizes.try_fold(Decimal::ZERO, |acc, size| acc.checked_add(*size))
}

fn saturating_volume<'a>(sizes: impl Iterator<Item = &'a Decimal>) -> Decimal {
    sizes.fold(Decimal::ZERO, |acc, size| acc.saturating_add(*size))
}
