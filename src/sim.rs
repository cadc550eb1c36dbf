//! In-memory venue simulation.
//!
//! [`SimExchange`] implements [`Transport`] against a single synthetic
//! market: resting orders are tracked by client id, acks and fills are
//! emitted on the user-event channel exactly as a live push stream would
//! deliver them, and depth deltas are produced as the simulated mid moves.
//! The paper-trading binary and the strategy tests both run the real
//! engines against it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::client_id::ClientOrderId;
use crate::errors::{Error, Result};
use crate::transport::{OpenOrder, OrderRequest, Transport};
use crate::types::{
    DepthDelta, DepthSnapshot, ExecutionType, OrderEvent, OrderStatus, PriceLevel, Side,
};

#[derive(Debug)]
struct SimInner {
    mid: f64,
    resting: Vec<OrderRequest>,
    // Exact prices last published as top-of-book, so a delta can zero them.
    last_bid: Option<f64>,
    last_ask: Option<f64>,
}

/// Simulated single-symbol venue.
#[derive(Debug)]
pub struct SimExchange {
    events: UnboundedSender<OrderEvent>,
    inner: Mutex<SimInner>,
    sequence: AtomicU64,
    reconnects: AtomicU64,
    fail_creates: AtomicBool,
}

impl SimExchange {
    /// Half-spread applied around the simulated mid, as a fraction.
    const HALF_SPREAD: f64 = 0.0001;

    pub fn new(start_mid: f64, events: UnboundedSender<OrderEvent>) -> Self {
        Self {
            events,
            inner: Mutex::new(SimInner {
                mid: start_mid,
                resting: Vec::new(),
                last_bid: None,
                last_ask: None,
            }),
            sequence: AtomicU64::new(1),
            reconnects: AtomicU64::new(0),
            fail_creates: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent `create_limit_order` fail (transport-error
    /// injection for tests).
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::Relaxed);
    }

    /// Currently resting orders, in placement order.
    pub fn resting_orders(&self) -> Vec<OrderRequest> {
        self.lock().resting.clone()
    }

    pub fn mid(&self) -> f64 {
        self.lock().mid
    }

    /// Number of user-stream reconnects requested so far.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    fn emit(&self, order: &OrderRequest, execution_type: ExecutionType, status: OrderStatus) {
        let _ = self.events.send(OrderEvent {
            execution_type,
            status,
            side: order.side,
            symbol: order.symbol.clone(),
            price: order.price,
            quantity: order.quantity,
            client_id: order.client_id.to_string(),
        });
    }

    /// Fully fill a resting order and emit the trade report.
    pub fn fill(&self, client_id: &str) -> bool {
        let removed = {
            let mut inner = self.lock();
            match inner
                .resting
                .iter()
                .position(|o| o.client_id.to_string() == client_id)
            {
                Some(idx) => Some(inner.resting.remove(idx)),
                None => None,
            }
        };
        match removed {
            Some(order) => {
                self.emit(&order, ExecutionType::Trade, OrderStatus::Filled);
                true
            }
            None => false,
        }
    }

    /// Emit a partial-fill report for a resting order, leaving it resting.
    pub fn partial_fill(&self, client_id: &str, quantity: f64) -> bool {
        let order = self
            .lock()
            .resting
            .iter()
            .find(|o| o.client_id.to_string() == client_id)
            .cloned();
        match order {
            Some(order) => {
                let partial = OrderRequest {
                    quantity,
                    ..order
                };
                self.emit(&partial, ExecutionType::Trade, OrderStatus::PartiallyFilled);
                true
            }
            None => false,
        }
    }

    /// Move the simulated mid, fill any orders the move crossed, and return
    /// the depth delta describing the new top of book.
    pub fn advance_mid(&self, symbol: &str, new_mid: f64) -> DepthDelta {
        let (crossed, delta) = {
            let mut inner = self.lock();
            inner.mid = new_mid;

            let crossed: Vec<OrderRequest> = {
                let resting = &mut inner.resting;
                let mut crossed = Vec::new();
                resting.retain(|o| {
                    let hit = match o.side {
                        Side::Buy => new_mid <= o.price,
                        Side::Sell => new_mid >= o.price,
                    };
                    if hit {
                        crossed.push(o.clone());
                    }
                    !hit
                });
                crossed
            };

            let bid = new_mid * (1.0 - Self::HALF_SPREAD);
            let ask = new_mid * (1.0 + Self::HALF_SPREAD);
            let mut bid_changes = Vec::new();
            let mut ask_changes = Vec::new();
            if let Some(old) = inner.last_bid.take() {
                bid_changes.push(PriceLevel::new(old, 0.0));
            }
            if let Some(old) = inner.last_ask.take() {
                ask_changes.push(PriceLevel::new(old, 0.0));
            }
            bid_changes.push(PriceLevel::new(bid, 10_000.0));
            ask_changes.push(PriceLevel::new(ask, 10_000.0));
            inner.last_bid = Some(bid);
            inner.last_ask = Some(ask);

            let delta = DepthDelta {
                symbol: symbol.to_string(),
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
                bid_changes,
                ask_changes,
            };
            (crossed, delta)
        };

        for order in &crossed {
            debug!(client_id = %order.client_id, price = order.price, "sim fill");
            self.emit(order, ExecutionType::Trade, OrderStatus::Filled);
        }
        delta
    }
}

#[async_trait]
impl Transport for SimExchange {
    async fn fetch_snapshot(&self, symbol: &str, depth: usize) -> Result<DepthSnapshot> {
        let mut inner = self.lock();
        let bid = inner.mid * (1.0 - Self::HALF_SPREAD);
        let ask = inner.mid * (1.0 + Self::HALF_SPREAD);
        inner.last_bid = Some(bid);
        inner.last_ask = Some(ask);

        let levels = depth.max(1);
        let bids = (0..levels)
            .map(|i| PriceLevel::new(bid * (1.0 - i as f64 * Self::HALF_SPREAD), 10_000.0))
            .collect();
        let asks = (0..levels)
            .map(|i| PriceLevel::new(ask * (1.0 + i as f64 * Self::HALF_SPREAD), 10_000.0))
            .collect();
        Ok(DepthSnapshot {
            symbol: symbol.to_string(),
            last_update_id: self.sequence.load(Ordering::Relaxed),
            bids,
            asks,
        })
    }

    async fn create_limit_order(&self, request: &OrderRequest) -> Result<()> {
        if self.fail_creates.load(Ordering::Relaxed) {
            return Err(Error::transport("simulated order placement failure"));
        }
        {
            let mut inner = self.lock();
            // Re-entry reuses the client id; replace any prior entry.
            inner
                .resting
                .retain(|o| o.client_id != request.client_id);
            inner.resting.push(request.clone());
        }
        self.emit(request, ExecutionType::New, OrderStatus::New);
        Ok(())
    }

    async fn cancel_order(&self, _symbol: &str, client_id: &ClientOrderId) -> Result<()> {
        let removed = {
            let mut inner = self.lock();
            match inner.resting.iter().position(|o| &o.client_id == client_id) {
                Some(idx) => Some(inner.resting.remove(idx)),
                None => None,
            }
        };
        match removed {
            Some(order) => {
                self.emit(&order, ExecutionType::Cancelled, OrderStatus::Cancelled);
                Ok(())
            }
            None => Err(Error::transport(format!(
                "cancel for unknown client order id {client_id}"
            ))),
        }
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        Ok(self
            .lock()
            .resting
            .iter()
            .filter(|o| o.symbol == symbol)
            .map(|o| OpenOrder {
                symbol: o.symbol.clone(),
                side: o.side,
                price: o.price,
                quantity: o.quantity,
                status: OrderStatus::New,
                client_id: o.client_id.to_string(),
            })
            .collect())
    }

    async fn reconnect_user_stream(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_id::StrategyTag;
    use tokio::sync::mpsc::unbounded_channel;

    fn request(side: Side, price: f64) -> OrderRequest {
        OrderRequest {
            symbol: "XLMUSDT".to_string(),
            side,
            price,
            quantity: 100.0,
            client_id: ClientOrderId::new(StrategyTag::Primary, side),
        }
    }

    #[tokio::test]
    async fn test_create_emits_new_event() {
        let (tx, mut rx) = unbounded_channel();
        let sim = SimExchange::new(0.1, tx);
        let req = request(Side::Buy, 0.099);
        sim.create_limit_order(&req).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.execution_type, ExecutionType::New);
        assert_eq!(event.client_id, req.client_id.to_string());
        assert_eq!(sim.resting_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_advance_mid_fills_crossed_orders() {
        let (tx, mut rx) = unbounded_channel();
        let sim = SimExchange::new(0.1, tx);
        sim.create_limit_order(&request(Side::Buy, 0.099)).await.unwrap();
        let _ = rx.recv().await.unwrap(); // New ack

        let delta = sim.advance_mid("XLMUSDT", 0.0985);
        assert!(delta.sequence > 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.execution_type, ExecutionType::Trade);
        assert_eq!(event.status, OrderStatus::Filled);
        assert!(sim.resting_orders().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_order_errors() {
        let (tx, _rx) = unbounded_channel();
        let sim = SimExchange::new(0.1, tx);
        let id = ClientOrderId::new(StrategyTag::Grid, Side::Sell);
        assert!(sim.cancel_order("XLMUSDT", &id).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_creates_injection() {
        let (tx, _rx) = unbounded_channel();
        let sim = SimExchange::new(0.1, tx);
        sim.set_fail_creates(true);
        assert!(sim.create_limit_order(&request(Side::Buy, 0.099)).await.is_err());
        assert!(sim.resting_orders().is_empty());
    }
}
