//! Parser module for normalized order book feed messages
//!
//! Defines the snapshot and delta types consumed by the book maintainer and
//! handles deserialization of the normalized JSON feed format.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A (venue, symbol) pair identifying one book
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VenueSymbol {
    pub venue: String,
    pub symbol: String,
}

impl VenueSymbol {
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for VenueSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.venue, self.symbol)
    }
}

/// Price level (price, size pair)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl DepthLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Notional value of the level (price x size)
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// Action carried by a single level update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Update,
    Delete,
}

/// One price level change inside a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUpdate {
    pub price: Decimal,
    pub size: Decimal,
    pub action: UpdateAction,
}

impl LevelUpdate {
    pub fn update(price: Decimal, size: Decimal) -> Self {
        Self {
            price,
            size,
            action: UpdateAction::Update,
        }
    }

    pub fn delete(price: Decimal) -> Self {
        Self {
            price,
            size: Decimal::ZERO,
            action: UpdateAction::Delete,
        }
    }

    /// Whether applying this update removes the level
    pub fn removes_level(&self) -> bool {
        self.action == UpdateAction::Delete || self.size <= Decimal::ZERO
    }
}

/// Full, authoritative book state at a sequence number
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookSnapshot {
    pub venue: String,
    pub symbol: String,

    /// Sequence number the snapshot is consistent with
    pub seq: u64,

    /// Bids, best (highest) first
    #[serde(deserialize_with = "deserialize_depth_levels")]
    pub bids: Vec<DepthLevel>,

    /// Asks, best (lowest) first
    #[serde(deserialize_with = "deserialize_depth_levels")]
    pub asks: Vec<DepthLevel>,

    /// Snapshot time (milliseconds on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// One atomic incremental change to a book
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookDelta {
    pub venue: String,
    pub symbol: String,

    /// Must be exactly the book's current seq + 1 to apply
    pub seq: u64,

    #[serde(rename = "bids", deserialize_with = "deserialize_level_updates")]
    pub bid_updates: Vec<LevelUpdate>,

    #[serde(rename = "asks", deserialize_with = "deserialize_level_updates")]
    pub ask_updates: Vec<LevelUpdate>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl OrderBookDelta {
    pub fn key(&self) -> VenueSymbol {
        VenueSymbol::new(&self.venue, &self.symbol)
    }
}

/// Parsed feed message
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Delta(OrderBookDelta),
    Heartbeat,
    Unknown(String),
}

impl FeedMessage {
    /// Parse a raw feed message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("delta") => Ok(FeedMessage::Delta(serde_json::from_value(value)?)),
            Some("heartbeat") => Ok(FeedMessage::Heartbeat),
            _ => Ok(FeedMessage::Unknown(raw.to_string())),
        }
    }
}

/// Custom deserializer for price levels from array of string pairs
fn deserialize_depth_levels<'de, D>(deserializer: D) -> Result<Vec<DepthLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(DepthLevel {
                price: Decimal::from_str(&pair[0]).map_err(serde::de::Error::custom)?,
                size: Decimal::from_str(&pair[1]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}

/// Level updates are `[price, size]` or `[price, size, "delete"]`
fn deserialize_level_updates<'de, D>(deserializer: D) -> Result<Vec<LevelUpdate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|entry| {
            let action = match entry.len() {
                2 => UpdateAction::Update,
                3 => match entry[2].as_str() {
                    "update" => UpdateAction::Update,
                    "delete" => UpdateAction::Delete,
                    other => {
                        return Err(serde::de::Error::custom(format!(
                            "Unknown level action: {}",
                            other
                        )))
                    }
                },
                _ => return Err(serde::de::Error::custom("Invalid level update format")),
            };
            Ok(LevelUpdate {
                price: Decimal::from_str(&entry[0]).map_err(serde::de::Error::custom)?,
                size: Decimal::from_str(&entry[1]).map_err(serde::de::Error::custom)?,
                action,
            })
        })
        .collect()
}
