//! Locally-synchronized order book cache.
//!
//! One [`DepthCache`] holds per-symbol bid/ask ladders built from a REST
//! snapshot and kept current by sequenced incremental deltas. The sequence
//! gate is the correctness core: a delta whose sequence number is not
//! strictly greater than the last applied one is dropped, which makes replay
//! and out-of-order delivery harmless.
//!
//! The delta consumer task is the single writer; readers take short read
//! locks so a mid-price query always observes both sides from the same
//! update.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ordered_float::OrderedFloat;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::transport::Transport;
use crate::types::{DepthDelta, DepthSnapshot, PriceLevel};

type PriceMap = BTreeMap<OrderedFloat<f64>, f64>;

/// One symbol's book state.
#[derive(Debug, Default)]
struct SymbolBook {
    bids: PriceMap,
    asks: PriceMap,
    last_sequence: u64,
}

/// Per-symbol order book cache with sequence-gated delta application.
#[derive(Debug, Default)]
pub struct DepthCache {
    books: RwLock<HashMap<String, SymbolBook>>,
}

impl DepthCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SymbolBook>> {
        self.books.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SymbolBook>> {
        self.books.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch a snapshot through the transport and install it.
    ///
    /// On error the symbol stays unsynchronized (deltas for it keep being
    /// dropped); the caller retries at its own cadence.
    pub async fn initialize(
        &self,
        transport: &dyn Transport,
        symbol: &str,
        depth: usize,
    ) -> Result<()> {
        let snapshot = transport.fetch_snapshot(symbol, depth).await?;
        self.apply_snapshot(snapshot);
        Ok(())
    }

    /// Install a snapshot, replacing any existing book for the symbol
    /// wholesale. Zero-quantity levels are discarded at load.
    pub fn apply_snapshot(&self, snapshot: DepthSnapshot) {
        let mut book = SymbolBook {
            last_sequence: snapshot.last_update_id,
            ..SymbolBook::default()
        };
        for level in &snapshot.bids {
            if level.quantity != 0.0 {
                book.bids.insert(OrderedFloat(level.price), level.quantity);
            }
        }
        for level in &snapshot.asks {
            if level.quantity != 0.0 {
                book.asks.insert(OrderedFloat(level.price), level.quantity);
            }
        }
        info!(
            symbol = %snapshot.symbol,
            sequence = snapshot.last_update_id,
            bids = book.bids.len(),
            asks = book.asks.len(),
            "depth snapshot installed"
        );
        self.write().insert(snapshot.symbol, book);
    }

    /// Apply one incremental update.
    ///
    /// Silently dropped (debug log only) when the symbol has no snapshot yet
    /// or when `delta.sequence <= last_sequence`. A change with quantity `0`
    /// removes the level if present and is a no-op if absent; the maps never
    /// hold a zero-quantity entry.
    pub fn apply_delta(&self, delta: &DepthDelta) {
        let mut books = self.write();
        let Some(book) = books.get_mut(&delta.symbol) else {
            debug!(symbol = %delta.symbol, "dropping delta for unsynchronized symbol");
            return;
        };
        if delta.sequence <= book.last_sequence {
            debug!(
                symbol = %delta.symbol,
                sequence = delta.sequence,
                last_sequence = book.last_sequence,
                "dropping stale depth delta"
            );
            return;
        }

        apply_changes(&mut book.bids, &delta.bid_changes);
        apply_changes(&mut book.asks, &delta.ask_changes);
        book.last_sequence = delta.sequence;
    }

    /// Midpoint between the best bid and best ask.
    ///
    /// Both sides are read under one lock so the result never mixes bids and
    /// asks from different updates. An empty side is an error; callers skip
    /// the current reprice cycle rather than acting on a stale value.
    pub fn mid_price(&self, symbol: &str) -> Result<f64> {
        let books = self.read();
        let book = books
            .get(symbol)
            .ok_or_else(|| Error::NoSnapshot(symbol.to_string()))?;
        let best_bid = book.bids.keys().next_back().ok_or_else(|| Error::EmptyBook {
            symbol: symbol.to_string(),
            side: "bid",
        })?;
        let best_ask = book.asks.keys().next().ok_or_else(|| Error::EmptyBook {
            symbol: symbol.to_string(),
            side: "ask",
        })?;
        Ok((best_bid.0 + best_ask.0) / 2.0)
    }

    /// Last applied sequence number, if the symbol is synchronized.
    pub fn last_sequence(&self, symbol: &str) -> Option<u64> {
        self.read().get(symbol).map(|b| b.last_sequence)
    }

    /// Top `n` levels per side: bids best-first (descending), asks best-first
    /// (ascending). Used by the paper-trading display.
    pub fn top_levels(&self, symbol: &str, n: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let books = self.read();
        let Some(book) = books.get(symbol) else {
            return (Vec::new(), Vec::new());
        };
        let bids = book
            .bids
            .iter()
            .rev()
            .take(n)
            .map(|(p, q)| PriceLevel::new(p.0, *q))
            .collect();
        let asks = book
            .asks
            .iter()
            .take(n)
            .map(|(p, q)| PriceLevel::new(p.0, *q))
            .collect();
        (bids, asks)
    }
}

fn apply_changes(map: &mut PriceMap, changes: &[PriceLevel]) {
    for change in changes {
        if change.quantity == 0.0 {
            map.remove(&OrderedFloat(change.price));
        } else {
            map.insert(OrderedFloat(change.price), change.quantity);
        }
    }
}

/// Drain the depth-delta queue into the cache, strictly in enqueue order.
///
/// Blocks on the channel instead of sleeping, so the book is updated the
/// moment a delta arrives. Runs until the producer side is dropped.
pub async fn run_depth_consumer(cache: Arc<DepthCache>, mut receiver: UnboundedReceiver<DepthDelta>) {
    while let Some(delta) = receiver.recv().await {
        cache.apply_delta(&delta);
    }
    debug!("depth delta channel closed, consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn snapshot(symbol: &str, seq: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> DepthSnapshot {
        DepthSnapshot {
            symbol: symbol.to_string(),
            last_update_id: seq,
            bids: bids.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect(),
            asks: asks.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect(),
        }
    }

    fn delta(symbol: &str, seq: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> DepthDelta {
        DepthDelta {
            symbol: symbol.to_string(),
            sequence: seq,
            bid_changes: bids.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect(),
            ask_changes: asks.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect(),
        }
    }

    #[test]
    fn test_mid_price() {
        let cache = DepthCache::new();
        cache.apply_snapshot(snapshot(
            "XLMUSDT",
            1,
            &[(10.0, 1.0), (9.9, 2.0)],
            &[(10.2, 1.0), (10.3, 1.0)],
        ));
        let mid = cache.mid_price("XLMUSDT").unwrap();
        assert!((mid - 10.1).abs() < 1e-12);
    }

    #[test]
    fn test_mid_price_requires_both_sides() {
        let cache = DepthCache::new();
        cache.apply_snapshot(snapshot("XLMUSDT", 1, &[(10.0, 1.0)], &[]));
        assert!(matches!(
            cache.mid_price("XLMUSDT"),
            Err(Error::EmptyBook { side: "ask", .. })
        ));
        assert!(matches!(
            cache.mid_price("OTHER"),
            Err(Error::NoSnapshot(_))
        ));
    }

    #[test]
    fn test_stale_and_replayed_deltas_are_dropped() {
        let cache = DepthCache::new();
        cache.apply_snapshot(snapshot("XLMUSDT", 5, &[(100.0, 5.0)], &[(101.0, 5.0)]));

        // Equal sequence: dropped.
        cache.apply_delta(&delta("XLMUSDT", 5, &[(100.0, 9.0)], &[]));
        // Lower sequence: dropped.
        cache.apply_delta(&delta("XLMUSDT", 3, &[(100.0, 9.0)], &[]));

        let (bids, _) = cache.top_levels("XLMUSDT", 1);
        assert_eq!(bids, vec![PriceLevel::new(100.0, 5.0)]);
        assert_eq!(cache.last_sequence("XLMUSDT"), Some(5));
    }

    #[test]
    fn test_delta_for_unsynchronized_symbol_is_dropped() {
        let cache = DepthCache::new();
        cache.apply_delta(&delta("XLMUSDT", 1, &[(100.0, 1.0)], &[]));
        assert_eq!(cache.last_sequence("XLMUSDT"), None);
    }

    #[test]
    fn test_zero_quantity_removes_level() {
        let cache = DepthCache::new();
        cache.apply_snapshot(snapshot("XLMUSDT", 1, &[(100.0, 5.0)], &[(101.0, 5.0)]));

        // Removal of a present level plus a no-op removal of an absent one.
        cache.apply_delta(&delta("XLMUSDT", 2, &[(100.0, 0.0), (98.5, 0.0)], &[]));

        let (bids, asks) = cache.top_levels("XLMUSDT", 10);
        assert!(bids.is_empty());
        assert_eq!(asks.len(), 1);
        assert_eq!(cache.last_sequence("XLMUSDT"), Some(2));
    }

    #[test]
    fn test_snapshot_discards_zero_quantity_levels() {
        let cache = DepthCache::new();
        cache.apply_snapshot(snapshot(
            "XLMUSDT",
            1,
            &[(100.0, 5.0), (99.0, 0.0)],
            &[(101.0, 0.0), (102.0, 2.0)],
        ));
        let (bids, asks) = cache.top_levels("XLMUSDT", 10);
        assert_eq!(bids, vec![PriceLevel::new(100.0, 5.0)]);
        assert_eq!(asks, vec![PriceLevel::new(102.0, 2.0)]);
    }

    #[test]
    fn test_snapshot_then_delta_then_replay() {
        // End-to-end scenario: snapshot seq=1, delta seq=2 moves the bid,
        // replaying the same delta changes nothing.
        let cache = DepthCache::new();
        cache.apply_snapshot(snapshot("XLMUSDT", 1, &[(100.0, 5.0)], &[(101.0, 5.0)]));

        let d = delta("XLMUSDT", 2, &[(100.0, 0.0), (99.0, 3.0)], &[]);
        cache.apply_delta(&d);
        let (bids, _) = cache.top_levels("XLMUSDT", 10);
        assert_eq!(bids, vec![PriceLevel::new(99.0, 3.0)]);

        cache.apply_delta(&d);
        let (bids, _) = cache.top_levels("XLMUSDT", 10);
        assert_eq!(bids, vec![PriceLevel::new(99.0, 3.0)]);
        assert_eq!(cache.last_sequence("XLMUSDT"), Some(2));
    }

    #[test]
    fn test_nonzero_quantity_overwrites_level() {
        let cache = DepthCache::new();
        cache.apply_snapshot(snapshot("XLMUSDT", 1, &[(100.0, 5.0)], &[(101.0, 5.0)]));
        cache.apply_delta(&delta("XLMUSDT", 2, &[(100.0, 7.5)], &[(101.5, 1.0)]));

        let (bids, asks) = cache.top_levels("XLMUSDT", 10);
        assert_eq!(bids, vec![PriceLevel::new(100.0, 7.5)]);
        assert_eq!(
            asks,
            vec![PriceLevel::new(101.0, 5.0), PriceLevel::new(101.5, 1.0)]
        );
    }

    #[tokio::test]
    async fn test_consumer_applies_in_enqueue_order() {
        let cache = Arc::new(DepthCache::new());
        cache.apply_snapshot(snapshot("XLMUSDT", 1, &[(100.0, 5.0)], &[(101.0, 5.0)]));

        let (tx, rx) = unbounded_channel();
        tx.send(delta("XLMUSDT", 2, &[(99.0, 1.0)], &[])).unwrap();
        tx.send(delta("XLMUSDT", 3, &[(99.0, 0.0)], &[])).unwrap();
        tx.send(delta("XLMUSDT", 4, &[(98.0, 2.0)], &[])).unwrap();
        drop(tx);

        run_depth_consumer(Arc::clone(&cache), rx).await;

        let (bids, _) = cache.top_levels("XLMUSDT", 10);
        assert_eq!(
            bids,
            vec![PriceLevel::new(100.0, 5.0), PriceLevel::new(98.0, 2.0)]
        );
        assert_eq!(cache.last_sequence("XLMUSDT"), Some(4));
    }
}
