//! Order book wire types.

use serde::{Deserialize, Serialize};

/// A single `(price, quantity)` book level.
///
/// In a delta, quantity `0` means "remove this price level".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

/// Point-in-time order book snapshot returned by the REST transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    /// Sequence number the snapshot is current through.
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Incremental depth update pushed by the venue, in exchange-assigned
/// sequence order per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthDelta {
    pub symbol: String,
    pub sequence: u64,
    pub bid_changes: Vec<PriceLevel>,
    pub ask_changes: Vec<PriceLevel>,
}
