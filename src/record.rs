//! Order lifecycle records.
//!
//! An [`OrderRecord`] tracks one ladder slot through its entry →
//! take-profit cycle. State is derived purely from inbound order/trade
//! events by [`OrderRecord::transition`]; the ladder engines own the records
//! and are the only writers.

use tracing::debug;

use crate::client_id::ClientOrderId;
use crate::transport::{OpenOrder, OrderRequest};
use crate::types::{ExecutionType, OrderEvent, OrderStatus, Side};

/// Lifecycle of a ladder slot's order.
///
/// `*Pending` states are local-only: they mark an order submitted but not yet
/// confirmed by the venue's `New` execution report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    EntryPending,
    EntryOpen,
    EntryPartiallyFilled,
    EntryFilled,
    TakeProfitPending,
    TakeProfitOpen,
    TakeProfitFilled,
}

impl LifecycleState {
    /// Whether the slot's take-profit leg exists (pending, resting or done).
    pub fn is_take_profit(&self) -> bool {
        matches!(
            self,
            LifecycleState::TakeProfitPending
                | LifecycleState::TakeProfitOpen
                | LifecycleState::TakeProfitFilled
        )
    }

    /// Whether the slot still occupies its price level on the entry side.
    pub fn is_entry(&self) -> bool {
        !self.is_take_profit()
    }

    /// A fill is settling on this slot. The user-stream reconnect is held
    /// off while any slot is in one of these states.
    pub fn is_settling(&self) -> bool {
        matches!(
            self,
            LifecycleState::EntryFilled | LifecycleState::TakeProfitFilled
        )
    }
}

/// One resting (or settling) order owned by a ladder engine.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub symbol: String,
    /// Current side on the book. Flips to the opposite of
    /// `client_id.entry_side()` while the take-profit leg rests.
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub client_id: ClientOrderId,
    /// Venue-reported status from the last event.
    pub status: OrderStatus,
    pub state: LifecycleState,
    /// Price the position was anchored at (entry price; for the grid ladder,
    /// snapped to the nearest grid level on activation).
    pub anchor_price: f64,
    /// Base-currency value recovered by the closing fill, used to size the
    /// compounding re-entry.
    pub realized_proceeds: Option<f64>,
    /// Tier index the order was placed at. Assigned at placement time and
    /// never inferred from ordering.
    pub position_index: usize,
}

impl OrderRecord {
    /// Record for a just-submitted entry order, awaiting venue confirmation.
    pub fn pending_entry(request: &OrderRequest, position_index: usize) -> Self {
        Self {
            symbol: request.symbol.clone(),
            side: request.side,
            price: request.price,
            quantity: request.quantity,
            client_id: request.client_id.clone(),
            status: OrderStatus::New,
            state: LifecycleState::EntryPending,
            anchor_price: request.price,
            realized_proceeds: None,
            position_index,
        }
    }

    /// Record for a just-submitted take-profit order.
    ///
    /// `anchor_price` is the entry fill the leg is taking profit on;
    /// `realized_proceeds` carries the entry's recovered base-currency value
    /// (set for sell entries) forward for re-entry sizing.
    pub fn pending_take_profit(
        request: &OrderRequest,
        anchor_price: f64,
        realized_proceeds: Option<f64>,
        position_index: usize,
    ) -> Self {
        Self {
            symbol: request.symbol.clone(),
            side: request.side,
            price: request.price,
            quantity: request.quantity,
            client_id: request.client_id.clone(),
            status: OrderStatus::New,
            state: LifecycleState::TakeProfitPending,
            anchor_price,
            realized_proceeds,
            position_index,
        }
    }

    /// Rebuild a record from the venue's open-orders query at startup.
    ///
    /// Whether this is an entry or a take-profit leg is recovered from the
    /// order's current side versus the id's role tag.
    pub fn from_open_order(order: &OpenOrder, client_id: ClientOrderId, position_index: usize) -> Self {
        let on_entry_side = order.side == client_id.entry_side();
        let state = match (order.status, on_entry_side) {
            (OrderStatus::PartiallyFilled, true) => LifecycleState::EntryPartiallyFilled,
            (_, true) => LifecycleState::EntryOpen,
            (_, false) => LifecycleState::TakeProfitOpen,
        };
        Self {
            symbol: order.symbol.clone(),
            side: order.side,
            price: order.price,
            quantity: order.quantity,
            client_id,
            status: order.status,
            state,
            anchor_price: if on_entry_side { order.price } else { 0.0 },
            realized_proceeds: None,
            position_index,
        }
    }

    /// Derive the successor record for an inbound event.
    ///
    /// Returns `None` when the event does not change lifecycle state
    /// (cancels, rejects, duplicate fills); the caller keeps the prior
    /// record and at most logs the event.
    pub fn transition(
        event: &OrderEvent,
        client_id: &ClientOrderId,
        prior: Option<&OrderRecord>,
    ) -> Option<OrderRecord> {
        let on_entry_side = event.side == client_id.entry_side();
        let position_index = prior.map(|p| p.position_index).unwrap_or(0);
        let prior_anchor = prior.map(|p| p.anchor_price).unwrap_or(0.0);
        let prior_realized = prior.and_then(|p| p.realized_proceeds);

        // A replayed entry-side report after the take-profit leg went out
        // must not restart the cycle.
        if on_entry_side && prior.is_some_and(|p| p.state.is_take_profit()) {
            debug!(client_id = %client_id, "ignoring entry-side event for take-profit slot");
            return None;
        }

        let (state, anchor_price, realized_proceeds) = match (event.execution_type, event.status) {
            (ExecutionType::New, _) => {
                if on_entry_side {
                    (LifecycleState::EntryOpen, event.price, prior_realized)
                } else {
                    (LifecycleState::TakeProfitOpen, prior_anchor, prior_realized)
                }
            }
            (ExecutionType::Trade, OrderStatus::Filled) => {
                if on_entry_side {
                    // Sell entries recover base currency at the entry fill;
                    // buy entries recover it when the take-profit closes.
                    let realized = (client_id.entry_side() == Side::Sell)
                        .then(|| event.price * event.quantity);
                    (LifecycleState::EntryFilled, event.price, realized)
                } else {
                    let realized = (client_id.entry_side() == Side::Buy)
                        .then(|| event.price * event.quantity)
                        .or(prior_realized);
                    (LifecycleState::TakeProfitFilled, prior_anchor, realized)
                }
            }
            (ExecutionType::Trade, OrderStatus::PartiallyFilled) if on_entry_side => {
                // The tier stays anchored at its current order until fully
                // filled rather than being cancelled and replaced.
                (LifecycleState::EntryPartiallyFilled, event.price, prior_realized)
            }
            _ => return None,
        };

        Some(OrderRecord {
            symbol: event.symbol.clone(),
            side: event.side,
            price: event.price,
            quantity: event.quantity,
            client_id: client_id.clone(),
            status: event.status,
            state,
            anchor_price,
            realized_proceeds,
            position_index,
        })
    }
}
