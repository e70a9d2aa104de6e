//! Network feed adapter
//!
//! Pulls snapshots over REST and streams deltas over WebSocket from a
//! normalized market data gateway.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use super::{BookFeedAdapter, DeltaStream};
use crate::error::{MarketDataError, Result};
use crate::parser::{FeedMessage, OrderBookDelta, OrderBookSnapshot};

/// REST + WebSocket feed adapter
pub struct NetworkFeed {
    http: reqwest::Client,
    rest_endpoint: String,
    ws_endpoint: String,
    depth_levels: usize,
}

impl NetworkFeed {
    pub fn new(rest_endpoint: &str, ws_endpoint: &str, depth_levels: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_endpoint: rest_endpoint.trim_end_matches('/').to_string(),
            ws_endpoint: ws_endpoint.trim_end_matches('/').to_string(),
            depth_levels,
        }
    }

    fn snapshot_url(&self, venue: &str, symbol: &str) -> String {
        format!(
            "{}/depth?venue={}&symbol={}&limit={}",
            self.rest_endpoint, venue, symbol, self.depth_levels
        )
    }

    fn stream_url(&self, venue: &str, symbol: &str) -> String {
        format!(
            "{}/{}/{}@depth",
            self.ws_endpoint,
            venue.to_lowercase(),
            symbol.to_lowercase()
        )
    }
}

#[async_trait]
impl BookFeedAdapter for NetworkFeed {
    async fn fetch_snapshot(&self, venue: &str, symbol: &str) -> Result<OrderBookSnapshot> {
        let url = self.snapshot_url(venue, symbol);
        debug!(venue = %venue, symbol = %symbol, url = %url, "Fetching order book snapshot");

        let fetch_error = |reason: String| MarketDataError::SnapshotFetch {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            reason,
        };

        self.http
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| fetch_error(e.to_string()))?
            .json::<OrderBookSnapshot>()
            .await
            .map_err(|e| fetch_error(e.to_string()))
    }

    async fn subscribe(&self, venue: &str, symbol: &str) -> Result<DeltaStream> {
        let url = self.stream_url(venue, symbol);
        info!(url = %url, "Connecting to delta stream");

        let (ws_stream, response) = connect_async(&url).await.map_err(|e| {
            MarketDataError::FeedConnection(format!("Failed to connect: {}", e))
        })?;
        info!(status = ?response.status(), venue = %venue, symbol = %symbol, "Delta stream connected");

        // Pongs are queued by tungstenite on read; only data frames surface here
        let stream = ws_stream
            .filter_map(|frame| async move { decode_frame(frame) })
            .boxed();
        Ok(stream)
    }
}

/// Map one WebSocket frame to a stream item. `None` skips the frame.
fn decode_frame(
    frame: std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<OrderBookDelta>> {
    match frame {
        Ok(Message::Text(text)) => decode_text(&text),
        Ok(Message::Binary(data)) => decode_text(&String::from_utf8_lossy(&data)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        Ok(Message::Close(frame)) => {
            warn!(frame = ?frame, "Received close frame");
            None
        }
        Err(e) => Some(Err(MarketDataError::FeedMessage(e.to_string()))),
    }
}

fn decode_text(text: &str) -> Option<Result<OrderBookDelta>> {
    match FeedMessage::parse(text) {
        Ok(FeedMessage::Delta(delta)) => Some(Ok(delta)),
        Ok(FeedMessage::Heartbeat) => None,
        Ok(FeedMessage::Unknown(msg)) => {
            tracing::trace!(msg = %msg, "Unknown message type");
            None
        }
        Err(e) => Some(Err(e.into())),
    }
}
