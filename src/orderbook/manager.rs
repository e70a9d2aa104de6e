//! Book maintainer
//!
//! Owns one [`DepthBook`] per (venue, symbol). Each pair gets its own worker
//! task that subscribes to the delta stream, bootstraps from a snapshot and
//! applies deltas strictly in sequence. Gaps, malformed messages, disconnects
//! and staleness all funnel into a debounced resync that restarts the worker.

use chrono::Utc;
use dashmap::DashMap;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, info, trace, warn};

use super::{BookAggregates, BookStatus, BookView, DeltaOutcome, DepthBook, ResyncTimer};
use crate::backoff::ExponentialBackoff;
use crate::error::{MarketDataError, Result};
use crate::feed::{BookFeedAdapter, DeltaStream};
use crate::parser::{OrderBookDelta, VenueSymbol};

/// Tunables for the maintainer
#[derive(Debug, Clone)]
pub struct MaintainerSettings {
    /// Levels per side returned by `get_book`
    pub view_depth: usize,
    /// Band around mid used for depth aggregates (0.01 = 1%)
    pub depth_band_pct: Decimal,
    pub stale_threshold: Duration,
    pub resync_debounce: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
    /// Consecutive snapshot failures before a pair reports unhealthy
    pub unhealthy_after_failures: u32,
}

impl Default for MaintainerSettings {
    fn default() -> Self {
        Self {
            view_depth: 20,
            depth_band_pct: Decimal::new(1, 2),
            stale_threshold: Duration::from_secs(30),
            resync_debounce: Duration::from_secs(2),
            retry_base: Duration::from_millis(500),
            retry_max: Duration::from_secs(30),
            unhealthy_after_failures: 5,
        }
    }
}

/// Health snapshot of one maintained pair
#[derive(Debug, Clone, Serialize)]
pub struct BookHealth {
    pub venue: String,
    pub symbol: String,
    pub status: BookStatus,
    pub seq: u64,
    /// Seconds since the last applied update, if any
    pub staleness_secs: Option<f64>,
    pub gaps: u64,
    pub resyncs: u64,
    pub consecutive_failures: u32,
    pub resync_pending: bool,
    /// Cause of the most recent stale episode
    pub last_issue: Option<String>,
    pub healthy: bool,
}

#[derive(Debug)]
enum StaleReason {
    Gap(MarketDataError),
    Malformed(MarketDataError),
    Disconnect,
    Timeout,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Gap(e) => write!(f, "{}", e),
            StaleReason::Malformed(e) => write!(f, "malformed message: {}", e),
            StaleReason::Disconnect => write!(f, "feed disconnect"),
            StaleReason::Timeout => write!(f, "no updates within stale threshold"),
        }
    }
}

#[derive(Debug)]
struct PairState {
    status: BookStatus,
    /// Worker is subscribing / fetching a snapshot
    bootstrapping: bool,
    consecutive_failures: u32,
    gaps: u64,
    resyncs: u64,
    last_issue: Option<String>,
}

/// One maintained pair. Only its worker task writes `book`.
struct MaintainedBook {
    key: VenueSymbol,
    book: RwLock<DepthBook>,
    state: Mutex<PairState>,
    resync: ResyncTimer,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MaintainedBook {
    fn new(key: VenueSymbol, debounce: Duration) -> Self {
        Self {
            book: RwLock::new(DepthBook::new(&key.venue, &key.symbol)),
            key,
            state: Mutex::new(PairState {
                status: BookStatus::Uninitialized,
                bootstrapping: false,
                consecutive_failures: 0,
                gaps: 0,
                resyncs: 0,
                last_issue: None,
            }),
            resync: ResyncTimer::new(debounce),
            worker: Mutex::new(None),
        }
    }

    fn status(&self) -> BookStatus {
        self.state.lock().status
    }

    fn resync_in_flight(&self) -> bool {
        self.resync.is_pending() || self.state.lock().bootstrapping
    }

    /// Offer a delta; returns the reason to resync, if any
    fn handle_delta(&self, delta: &OrderBookDelta) -> Option<StaleReason> {
        if delta.venue != self.key.venue || delta.symbol != self.key.symbol {
            warn!(
                pair = %self.key,
                got = %delta.key(),
                "Delta for another pair on this subscription, skipping"
            );
            return None;
        }

        if self.status() == BookStatus::Stale {
            trace!(pair = %self.key, seq = delta.seq, "Book stale, discarding delta until resync");
            return None;
        }

        let outcome = self.book.write().try_apply_delta(delta);
        match outcome {
            DeltaOutcome::Applied => None,
            DeltaOutcome::Stale => {
                trace!(pair = %self.key, seq = delta.seq, "Stale delta dropped");
                None
            }
            DeltaOutcome::Gap { expected, got } => {
                self.state.lock().gaps += 1;
                Some(StaleReason::Gap(MarketDataError::SequenceGap { expected, got }))
            }
            DeltaOutcome::Uninitialized => {
                debug!(pair = %self.key, seq = delta.seq, "Delta before snapshot dropped");
                None
            }
        }
    }

    fn mark_stale(&self, reason: StaleReason) {
        let mut state = self.state.lock();
        if state.status != BookStatus::Uninitialized {
            state.status = BookStatus::Stale;
        }
        warn!(pair = %self.key, reason = %reason, "Book marked stale, scheduling resync");
        state.last_issue = Some(reason.to_string());
    }

    fn abort_worker(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }

    fn health(&self, settings: &MaintainerSettings) -> BookHealth {
        let now = Utc::now();
        let (seq, last_update, needs_resync) = {
            let book = self.book.read();
            (
                book.seq(),
                book.last_update(),
                book.is_initialized() && book.needs_resync(stale_threshold(settings), now),
            )
        };
        let resync_pending = self.resync.is_pending();
        let state = self.state.lock();

        let in_flight = resync_pending || state.bootstrapping;
        let healthy = state.consecutive_failures < settings.unhealthy_after_failures
            && !(needs_resync && !in_flight);

        BookHealth {
            venue: self.key.venue.clone(),
            symbol: self.key.symbol.clone(),
            status: state.status,
            seq,
            staleness_secs: last_update
                .map(|last| (now - last).num_milliseconds().max(0) as f64 / 1000.0),
            gaps: state.gaps,
            resyncs: state.resyncs,
            consecutive_failures: state.consecutive_failures,
            resync_pending,
            last_issue: state.last_issue.clone(),
            healthy,
        }
    }
}

fn stale_threshold(settings: &MaintainerSettings) -> chrono::Duration {
    chrono::Duration::from_std(settings.stale_threshold).unwrap_or_else(|_| chrono::Duration::days(365))
}

struct Inner {
    feed: Arc<dyn BookFeedAdapter>,
    settings: MaintainerSettings,
    books: DashMap<VenueSymbol, Arc<MaintainedBook>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Inner {
    fn entry(&self, key: &VenueSymbol) -> Option<Arc<MaintainedBook>> {
        self.books.get(key).map(|entry| entry.value().clone())
    }

    fn entry_or_err(&self, venue: &str, symbol: &str) -> Result<Arc<MaintainedBook>> {
        self.entry(&VenueSymbol::new(venue, symbol))
            .ok_or_else(|| MarketDataError::UnknownBook {
                venue: venue.to_string(),
                symbol: symbol.to_string(),
            })
    }

    /// Replace the pair's worker with a fresh one
    fn spawn_worker(self: &Arc<Self>, entry: Arc<MaintainedBook>) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(self);
        let feed = self.feed.clone();
        let settings = self.settings.clone();
        let task_entry = entry.clone();
        let handle = tokio::spawn(async move {
            run_pair(weak, feed, settings, task_entry).await;
        });

        if let Some(previous) = entry.worker.lock().replace(handle) {
            previous.abort();
        }
    }

    fn arm_resync(self: &Arc<Self>, entry: &MaintainedBook) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(self);
        let key = entry.key.clone();
        let replaced = entry.resync.arm(async move {
            if let Some(inner) = weak.upgrade() {
                inner.resync_fired(&key);
            }
        });

        if replaced {
            debug!(pair = %entry.key, "Resync timer re-armed");
        }
    }

    fn resync_fired(self: &Arc<Self>, key: &VenueSymbol) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let Some(entry) = self.entry(key) else {
            return;
        };

        entry.state.lock().resyncs += 1;
        info!(pair = %key, "Resync firing, restarting pair");
        self.spawn_worker(entry);
    }

    fn abort_all(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
        for entry in self.books.iter() {
            entry.abort_worker();
            entry.resync.cancel();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Worker for one pair: bootstrap, then apply deltas until the stream ends
async fn run_pair(
    inner: Weak<Inner>,
    feed: Arc<dyn BookFeedAdapter>,
    settings: MaintainerSettings,
    entry: Arc<MaintainedBook>,
) {
    let mut stream = bootstrap(feed.as_ref(), &settings, &entry).await;

    while let Some(item) = stream.next().await {
        let reason = match item {
            Ok(delta) => entry.handle_delta(&delta),
            Err(e) => {
                if entry.status() == BookStatus::Stale {
                    None
                } else {
                    warn!(pair = %entry.key, error = %e, "Malformed feed message");
                    Some(StaleReason::Malformed(e))
                }
            }
        };

        if let Some(reason) = reason {
            trigger_resync(&inner, &entry, reason);
        }
    }

    trigger_resync(&inner, &entry, StaleReason::Disconnect);
}

/// Subscribe, then fetch and apply a snapshot; retries with backoff until it succeeds.
///
/// Subscribing first lets the stream buffer deltas published while the
/// snapshot is in flight; those at or below the snapshot seq drop as stale.
async fn bootstrap(
    feed: &dyn BookFeedAdapter,
    settings: &MaintainerSettings,
    entry: &MaintainedBook,
) -> DeltaStream {
    let key = &entry.key;
    let mut backoff = ExponentialBackoff::new(settings.retry_base, settings.retry_max);
    entry.state.lock().bootstrapping = true;

    loop {
        match try_bootstrap(feed, entry).await {
            Ok(stream) => {
                let mut state = entry.state.lock();
                state.status = BookStatus::Synced;
                state.bootstrapping = false;
                state.consecutive_failures = 0;
                return stream;
            }
            Err(e) => {
                let failures = {
                    let mut state = entry.state.lock();
                    state.consecutive_failures += 1;
                    state.consecutive_failures
                };
                let delay = backoff.next_delay();
                warn!(
                    pair = %key,
                    error = %e,
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    "Bootstrap failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

async fn try_bootstrap(feed: &dyn BookFeedAdapter, entry: &MaintainedBook) -> Result<DeltaStream> {
    let key = &entry.key;
    let stream = feed.subscribe(&key.venue, &key.symbol).await?;
    let snapshot = feed.fetch_snapshot(&key.venue, &key.symbol).await?;

    if snapshot.venue != key.venue || snapshot.symbol != key.symbol {
        return Err(MarketDataError::SnapshotFetch {
            venue: key.venue.clone(),
            symbol: key.symbol.clone(),
            reason: format!("snapshot is for {}/{}", snapshot.venue, snapshot.symbol),
        });
    }

    entry.book.write().apply_snapshot(&snapshot);
    info!(
        pair = %key,
        seq = snapshot.seq,
        bids = snapshot.bids.len(),
        asks = snapshot.asks.len(),
        "Order book initialized from snapshot"
    );
    Ok(stream)
}

fn trigger_resync(inner: &Weak<Inner>, entry: &MaintainedBook, reason: StaleReason) {
    entry.mark_stale(reason);
    if let Some(inner) = inner.upgrade() {
        inner.arm_resync(entry);
    }
}

/// Maintains depth books for many (venue, symbol) pairs
#[derive(Clone)]
pub struct BookMaintainer {
    inner: Arc<Inner>,
}

impl BookMaintainer {
    pub fn new(feed: Arc<dyn BookFeedAdapter>, settings: MaintainerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                feed,
                settings,
                books: DashMap::new(),
                monitor: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn settings(&self) -> &MaintainerSettings {
        &self.inner.settings
    }

    /// Register the pair (empty book on first call) and (re)start its worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_maintaining(&self, venue: &str, symbol: &str) -> Result<()> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(MarketDataError::ShutDown);
        }

        let key = VenueSymbol::new(venue, symbol);
        let entry = self
            .inner
            .books
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(MaintainedBook::new(key.clone(), self.inner.settings.resync_debounce))
            })
            .value()
            .clone();

        entry.resync.cancel();
        info!(pair = %key, "Starting book maintenance");
        self.inner.spawn_worker(entry);
        Ok(())
    }

    /// Stop maintaining a pair and drop its book
    pub fn stop_maintaining(&self, venue: &str, symbol: &str) -> bool {
        match self.inner.books.remove(&VenueSymbol::new(venue, symbol)) {
            Some((key, entry)) => {
                entry.abort_worker();
                entry.resync.cancel();
                info!(pair = %key, "Stopped book maintenance");
                true
            }
            None => false,
        }
    }

    /// Mark the pair stale and (re)arm its debounced resync
    pub fn schedule_resync(&self, venue: &str, symbol: &str) -> Result<()> {
        let entry = self.inner.entry_or_err(venue, symbol)?;
        entry.mark_stale(StaleReason::Timeout);
        self.inner.arm_resync(&entry);
        Ok(())
    }

    /// Top levels of the book using the configured depth
    pub fn get_book(&self, venue: &str, symbol: &str) -> Result<BookView> {
        self.get_book_top(venue, symbol, self.inner.settings.view_depth)
    }

    /// Top `k` levels of the book. Stale books are returned, flagged.
    pub fn get_book_top(&self, venue: &str, symbol: &str, k: usize) -> Result<BookView> {
        let entry = self.inner.entry_or_err(venue, symbol)?;
        let status = entry.status();
        let view = entry.book.read().view(k, status);
        Ok(view)
    }

    /// Spread, depth and imbalance for the book
    pub fn get_aggregates(&self, venue: &str, symbol: &str) -> Result<BookAggregates> {
        let entry = self.inner.entry_or_err(venue, symbol)?;
        let status = entry.status();
        let mut aggregates = entry.book.read().aggregates(self.inner.settings.depth_band_pct);
        aggregates.stale = status != BookStatus::Synced;
        Ok(aggregates)
    }

    pub fn status(&self, venue: &str, symbol: &str) -> Option<BookStatus> {
        self.inner
            .entry(&VenueSymbol::new(venue, symbol))
            .map(|entry| entry.status())
    }

    pub fn maintained_pairs(&self) -> Vec<VenueSymbol> {
        let mut pairs: Vec<VenueSymbol> = self.inner.books.iter().map(|e| e.key().clone()).collect();
        pairs.sort();
        pairs
    }

    /// Per-pair health, sorted by pair
    pub fn book_health(&self) -> Vec<BookHealth> {
        let mut health: Vec<BookHealth> = self
            .inner
            .books
            .iter()
            .map(|entry| entry.health(&self.inner.settings))
            .collect();
        health.sort_by(|a, b| (&a.venue, &a.symbol).cmp(&(&b.venue, &b.symbol)));
        health
    }

    /// False if any pair is stale without a resync in flight, or keeps failing to bootstrap
    pub fn is_healthy(&self) -> bool {
        self.inner
            .books
            .iter()
            .all(|entry| entry.health(&self.inner.settings).healthy)
    }

    /// Mark synced books that have gone quiet as stale and schedule their resync.
    ///
    /// Returns the number of books newly scheduled.
    pub fn check_staleness(&self) -> usize {
        let now = Utc::now();
        let threshold = stale_threshold(&self.inner.settings);
        let entries: Vec<Arc<MaintainedBook>> =
            self.inner.books.iter().map(|e| e.value().clone()).collect();

        let mut scheduled = 0;
        for entry in entries {
            if entry.status() != BookStatus::Synced || entry.resync_in_flight() {
                continue;
            }
            if entry.book.read().needs_resync(threshold, now) {
                entry.mark_stale(StaleReason::Timeout);
                self.inner.arm_resync(&entry);
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Periodically run `check_staleness`; stopped by `shutdown`
    pub fn spawn_staleness_monitor(&self, period: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let scheduled = BookMaintainer { inner }.check_staleness();
                if scheduled > 0 {
                    info!(scheduled, "Staleness sweep scheduled resyncs");
                }
            }
        });

        if let Some(previous) = self.inner.monitor.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel every worker, pending resync and the staleness monitor, and drop all books
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.abort_all();
        let pairs = self.inner.books.len();
        self.inner.books.clear();
        info!(pairs, "Book maintainer shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FixtureFeed, MockBookFeedAdapter};
    use crate::parser::{DepthLevel, LevelUpdate, OrderBookSnapshot};
    use rust_decimal_macros::dec;

    fn settings() -> MaintainerSettings {
        MaintainerSettings {
            resync_debounce: Duration::from_secs(2),
            retry_base: Duration::from_millis(100),
            retry_max: Duration::from_secs(1),
            unhealthy_after_failures: 3,
            ..MaintainerSettings::default()
        }
    }

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

    fn delta(seq: u64) -> OrderBookDelta {
        OrderBookDelta {
            venue: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            seq,
            bid_updates: vec![LevelUpdate::update(dec!(99), Decimal::from(seq))],
            ask_updates: vec![],
            timestamp: Utc::now(),
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_then_apply() {
        let feed = Arc::new(FixtureFeed::new());
        feed.push_snapshot(snapshot(10));
        let maintainer = BookMaintainer::new(feed.clone(), settings());

        maintainer.start_maintaining("binance", "BTCUSDT").unwrap();
        settle().await;
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Synced));

        assert!(feed.send_delta(delta(11)));
        settle().await;

        let view = maintainer.get_book("binance", "BTCUSDT").unwrap();
        assert_eq!(view.seq, 11);
        assert_eq!(view.bids.len(), 2);
        assert!(!view.stale);
        assert!(maintainer.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_failures_retry_with_backoff() {
        let feed = Arc::new(FixtureFeed::new());
        feed.push_snapshot(snapshot(10));
        feed.fail_fetches("binance", "BTCUSDT", 4);
        let maintainer = BookMaintainer::new(feed.clone(), settings());

        maintainer.start_maintaining("binance", "BTCUSDT").unwrap();
        settle().await;
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Uninitialized));

        // Fetches fail at 0, 100, 300 and 700 ms
        sleep(Duration::from_millis(750)).await;
        assert_eq!(feed.fetch_count("binance", "BTCUSDT"), 4);
        assert!(!maintainer.is_healthy());

        sleep(Duration::from_millis(900)).await;
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Synced));
        assert!(maintainer.is_healthy());
        assert_eq!(maintainer.book_health()[0].consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_retried_through_mock() {
        let mut mock = MockBookFeedAdapter::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_subscribe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(MarketDataError::FeedConnection("refused".to_string())));
        mock.expect_subscribe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(futures_util::stream::pending().boxed()));
        mock.expect_fetch_snapshot()
            .times(1)
            .returning(|_, _| Ok(snapshot(5)));

        let maintainer = BookMaintainer::new(Arc::new(mock), settings());
        maintainer.start_maintaining("binance", "BTCUSDT").unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Synced));
        assert_eq!(maintainer.get_book("binance", "BTCUSDT").unwrap().seq, 5);
        maintainer.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gaps_collapse_into_single_resync() {
        let feed = Arc::new(FixtureFeed::new());
        feed.push_snapshot(snapshot(10));
        feed.push_snapshot(snapshot(20));
        let maintainer = BookMaintainer::new(feed.clone(), settings());

        maintainer.start_maintaining("binance", "BTCUSDT").unwrap();
        settle().await;

        assert!(feed.send_delta(delta(12)));
        assert!(feed.send_delta(delta(13)));
        assert!(feed.send_delta(delta(14)));
        settle().await;

        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Stale));
        let view = maintainer.get_book("binance", "BTCUSDT").unwrap();
        assert_eq!(view.seq, 10);
        assert!(view.stale);
        assert!(maintainer.book_health()[0].resync_pending);

        sleep(Duration::from_millis(2100)).await;
        settle().await;

        assert_eq!(feed.fetch_count("binance", "BTCUSDT"), 2);
        assert_eq!(feed.subscription_count("binance", "BTCUSDT"), 2);
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Synced));
        assert_eq!(maintainer.get_book("binance", "BTCUSDT").unwrap().seq, 20);

        let health = &maintainer.book_health()[0];
        assert_eq!(health.gaps, 1);
        assert_eq!(health.resyncs, 1);
        assert_eq!(
            health.last_issue.as_deref(),
            Some("Sequence gap: expected 11, got 12")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_and_malformed_trigger_resync() {
        let feed = Arc::new(FixtureFeed::new());
        feed.push_snapshot(snapshot(10));
        let maintainer = BookMaintainer::new(feed.clone(), settings());

        maintainer.start_maintaining("binance", "BTCUSDT").unwrap();
        settle().await;

        assert!(feed.send_malformed("binance", "BTCUSDT", "truncated"));
        settle().await;
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Stale));
        assert!(maintainer.book_health()[0]
            .last_issue
            .as_deref()
            .is_some_and(|issue| issue.contains("truncated")));

        sleep(Duration::from_millis(2100)).await;
        settle().await;
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Synced));

        assert!(feed.disconnect("binance", "BTCUSDT"));
        settle().await;
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Stale));

        sleep(Duration::from_millis(2100)).await;
        settle().await;
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Synced));
        assert_eq!(feed.subscription_count("binance", "BTCUSDT"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_sweep_schedules_resync() {
        let feed = Arc::new(FixtureFeed::new());
        feed.push_snapshot(OrderBookSnapshot {
            timestamp: Utc::now() - chrono::Duration::seconds(60),
            ..snapshot(10)
        });
        feed.push_snapshot(snapshot(30));
        let maintainer = BookMaintainer::new(feed.clone(), settings());

        maintainer.start_maintaining("binance", "BTCUSDT").unwrap();
        settle().await;

        assert!(!maintainer.is_healthy());
        assert_eq!(maintainer.check_staleness(), 1);
        assert_eq!(maintainer.check_staleness(), 0);
        assert!(maintainer.is_healthy());

        sleep(Duration::from_millis(2100)).await;
        settle().await;
        assert_eq!(maintainer.get_book("binance", "BTCUSDT").unwrap().seq, 30);
        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Synced));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_resync() {
        let feed = Arc::new(FixtureFeed::new());
        feed.push_snapshot(snapshot(10));
        let maintainer = BookMaintainer::new(feed.clone(), settings());

        maintainer.start_maintaining("binance", "BTCUSDT").unwrap();
        settle().await;
        maintainer.schedule_resync("binance", "BTCUSDT").unwrap();

        maintainer.shutdown();
        settle().await;
        assert!(!feed.is_subscribed("binance", "BTCUSDT"));

        sleep(Duration::from_secs(10)).await;
        assert_eq!(feed.fetch_count("binance", "BTCUSDT"), 1);
        assert!(maintainer.maintained_pairs().is_empty());
        assert!(matches!(
            maintainer.start_maintaining("binance", "BTCUSDT"),
            Err(MarketDataError::ShutDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairs_are_isolated() {
        let feed = Arc::new(FixtureFeed::new());
        feed.push_snapshot(snapshot(10));
        feed.push_snapshot(OrderBookSnapshot {
            venue: "kraken".to_string(),
            ..snapshot(50)
        });
        let maintainer = BookMaintainer::new(feed.clone(), settings());

        maintainer.start_maintaining("binance", "BTCUSDT").unwrap();
        maintainer.start_maintaining("kraken", "BTCUSDT").unwrap();
        settle().await;

        assert!(feed.send_delta(delta(15)));
        assert!(feed.send_delta(OrderBookDelta {
            venue: "kraken".to_string(),
            ..delta(51)
        }));
        settle().await;

        assert_eq!(maintainer.status("binance", "BTCUSDT"), Some(BookStatus::Stale));
        assert_eq!(maintainer.status("kraken", "BTCUSDT"), Some(BookStatus::Synced));
        assert_eq!(maintainer.get_book("kraken", "BTCUSDT").unwrap().seq, 51);
    }

    #[tokio::test]
    async fn test_unknown_book() {
        let maintainer = BookMaintainer::new(Arc::new(FixtureFeed::new()), settings());
        assert!(matches!(
            maintainer.get_book("nowhere", "BTCUSDT"),
            Err(MarketDataError::UnknownBook { .. })
        ));
        assert!(maintainer.is_healthy());
        assert!(!maintainer.stop_maintaining("nowhere", "BTCUSDT"));
    }
}
