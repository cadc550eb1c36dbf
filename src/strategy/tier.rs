//! Phase-1 fixed-tier ladder.
//!
//! Places a fixed number of entry orders on each side of the mid at
//! configured margin multiples and walks each through its take-profit cycle.
//! Every tier owns a slot; a slot's index is assigned at placement time and
//! is never inferred from price ordering, so tiers keep their identity as
//! orders move.

use tracing::{debug, info, warn};

use crate::client_id::{ClientOrderId, StrategyTag};
use crate::consts::EPSILON;
use crate::record::{LifecycleState, OrderRecord};
use crate::transport::{OrderRequest, Transport};
use crate::types::{OrderEvent, Side};

use super::config::{Pricing, TierLadderConfig};

/// Fixed-tier ladder engine.
///
/// Holds one slot per tier per side. Slots are `None` until an entry is
/// resting and revert to `None` when a placement fails, so the next reprice
/// cycle is the retry path for every failed venue call.
#[derive(Debug)]
pub struct TierLadderEngine {
    config: TierLadderConfig,
    pricing: Pricing,
    symbol: String,
    buys: Vec<Option<OrderRecord>>,
    sells: Vec<Option<OrderRecord>>,
    /// Reference for the move-threshold gate: the mid at the last reprice
    /// that crossed the threshold. Placements always price from the current
    /// mid; this only decides when resting entries are moved.
    reference_mid: f64,
    buy_profit_cycles: u64,
    sell_profit_cycles: u64,
}

impl TierLadderEngine {
    pub fn new(symbol: impl Into<String>, config: TierLadderConfig, pricing: Pricing) -> Self {
        let tiers = config.tiers;
        Self {
            config,
            pricing,
            symbol: symbol.into(),
            buys: vec![None; tiers],
            sells: vec![None; tiers],
            reference_mid: 0.0,
            buy_profit_cycles: 0,
            sell_profit_cycles: 0,
        }
    }

    pub fn buy_slots(&self) -> &[Option<OrderRecord>] {
        &self.buys
    }

    pub fn sell_slots(&self) -> &[Option<OrderRecord>] {
        &self.sells
    }

    /// Completed entry/take-profit cycles per side since startup.
    pub fn profit_cycles(&self) -> (u64, u64) {
        (self.buy_profit_cycles, self.sell_profit_cycles)
    }

    /// Entry price for a tier at the given mid.
    fn tier_price(&self, mid: f64, side: Side, index: usize) -> f64 {
        let offset = self.config.margin * self.config.tier_multipliers[index];
        let raw = match side {
            Side::Buy => mid * (1.0 - offset),
            Side::Sell => mid * (1.0 + offset),
        };
        self.pricing.round_price(raw)
    }

    /// Take-profit price for an entry filled at `anchor`.
    fn take_profit_price(&self, anchor: f64, entry_side: Side) -> f64 {
        let raw = match entry_side {
            Side::Buy => anchor * (1.0 + self.config.take_profit_margin),
            Side::Sell => anchor * (1.0 - self.config.take_profit_margin),
        };
        self.pricing.round_price(raw)
    }

    /// Whether a fill is settling on any slot (take-profit not yet resting).
    pub fn has_settling(&self) -> bool {
        self.buys
            .iter()
            .chain(self.sells.iter())
            .flatten()
            .any(|r| r.state.is_settling())
    }

    /// Whether every tier on both sides has reached its take-profit leg.
    pub fn all_cycled(&self) -> bool {
        self.buys.iter().chain(self.sells.iter()).all(|slot| {
            slot.as_ref().is_some_and(|r| {
                matches!(
                    r.state,
                    LifecycleState::TakeProfitOpen | LifecycleState::TakeProfitFilled
                )
            })
        })
    }

    /// Price window bracketed by the resting take-profit legs.
    ///
    /// The upper bound is the nearest sell take-profit (from a buy entry),
    /// the lower bound the nearest buy take-profit (from a sell entry).
    /// `None` until both sides have at least one take-profit leg and the
    /// window is non-empty.
    pub fn take_profit_window(&self) -> Option<(f64, f64)> {
        let upper = self
            .buys
            .iter()
            .flatten()
            .filter(|r| r.state.is_take_profit())
            .map(|r| r.price)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))));
        let lower = self
            .sells
            .iter()
            .flatten()
            .filter(|r| r.state.is_take_profit())
            .map(|r| r.price)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))));
        match (lower, upper) {
            (Some(lower), Some(upper)) if lower < upper => Some((lower, upper)),
            _ => None,
        }
    }

    /// Adopt an order reloaded from the venue at startup into the first free
    /// slot on its entry side.
    pub fn restore(&mut self, record: OrderRecord) {
        let side = record.client_id.entry_side();
        let slots = match side {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        };
        match slots.iter_mut().enumerate().find(|(_, s)| s.is_none()) {
            Some((index, slot)) => {
                info!(client_id = %record.client_id, side = ?side, tier = index, "restored tier order");
                let mut record = record;
                record.position_index = index;
                *slot = Some(record);
            }
            None => {
                warn!(client_id = %record.client_id, side = ?side, "no free tier slot for restored order");
            }
        }
    }

    /// One repricing pass: fill empty slots, chase the mid with resting
    /// entries once it moves past the threshold, retry stuck take-profit
    /// placements, and re-enter completed cycles.
    pub async fn reprice(&mut self, transport: &dyn Transport, mid: f64) {
        if self.reference_mid <= 0.0 {
            self.reference_mid = mid;
        }
        let moved = (mid - self.reference_mid).abs() > self.reference_mid * self.config.move_threshold;
        if moved {
            debug!(
                from = self.reference_mid,
                to = mid,
                "mid moved past threshold, repricing resting entries"
            );
            self.reference_mid = mid;
        }

        for side in [Side::Buy, Side::Sell] {
            let tiers = self.config.tiers;
            for index in 0..tiers {
                let slot = match side {
                    Side::Buy => self.buys[index].clone(),
                    Side::Sell => self.sells[index].clone(),
                };
                let next = match slot {
                    None => self.place_entry(transport, side, index, mid).await,
                    Some(record) => match record.state {
                        LifecycleState::EntryOpen if moved => {
                            self.move_entry(transport, record, mid).await
                        }
                        LifecycleState::EntryFilled => {
                            self.place_take_profit(transport, record).await
                        }
                        LifecycleState::TakeProfitFilled => {
                            self.reenter(transport, record, mid).await
                        }
                        _ => Some(record),
                    },
                };
                match side {
                    Side::Buy => self.buys[index] = next,
                    Side::Sell => self.sells[index] = next,
                }
            }
        }
    }

    /// Place a fresh entry for an empty slot. Returns the new record, or
    /// `None` if the placement failed (retried next cycle).
    async fn place_entry(
        &self,
        transport: &dyn Transport,
        side: Side,
        index: usize,
        mid: f64,
    ) -> Option<OrderRecord> {
        let price = self.tier_price(mid, side, index);
        let quantity = self.pricing.qty_for_notional(self.config.wager, price, side);
        if quantity <= 0.0 {
            warn!(price, tier = index, "wager too small for lot precision, skipping tier");
            return None;
        }
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            side,
            price,
            quantity,
            client_id: ClientOrderId::new(StrategyTag::Primary, side),
        };
        match transport.create_limit_order(&request).await {
            Ok(()) => {
                info!(client_id = %request.client_id, price, quantity, tier = index, "placed tier entry");
                Some(OrderRecord::pending_entry(&request, index))
            }
            Err(e) => {
                warn!(price, tier = index, error = %e, "tier entry placement failed");
                None
            }
        }
    }

    /// Cancel a resting entry and replace it at the tier's new price,
    /// preserving the order's notional value.
    async fn move_entry(
        &self,
        transport: &dyn Transport,
        record: OrderRecord,
        mid: f64,
    ) -> Option<OrderRecord> {
        let side = record.client_id.entry_side();
        let index = record.position_index;
        let price = self.tier_price(mid, side, index);
        if (price - record.price).abs() < EPSILON {
            return Some(record);
        }
        if let Err(e) = transport.cancel_order(&self.symbol, &record.client_id).await {
            warn!(client_id = %record.client_id, error = %e, "tier entry cancel failed, keeping order");
            return Some(record);
        }
        let notional = self.pricing.notional(record.price, record.quantity, side);
        let quantity = self.pricing.qty_for_notional(notional, price, side);
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            side,
            price,
            quantity,
            client_id: record.client_id.clone(),
        };
        match transport.create_limit_order(&request).await {
            Ok(()) => {
                info!(client_id = %request.client_id, from = record.price, to = price, "moved tier entry");
                Some(OrderRecord::pending_entry(&request, index))
            }
            Err(e) => {
                // Cancelled but not replaced; the slot refills next cycle.
                warn!(client_id = %record.client_id, error = %e, "tier entry replace failed");
                None
            }
        }
    }

    /// Place the take-profit leg for a filled entry, reusing its client id.
    ///
    /// Called from the event path when the fill arrives and again from the
    /// reprice path while the slot is stuck in `EntryFilled`.
    async fn place_take_profit(
        &self,
        transport: &dyn Transport,
        record: OrderRecord,
    ) -> Option<OrderRecord> {
        let entry_side = record.client_id.entry_side();
        let price = self.take_profit_price(record.anchor_price, entry_side);
        let quantity = match entry_side {
            // Sell back what the entry bought.
            Side::Buy => record.quantity,
            // Buy back base with the quote the entry recovered.
            Side::Sell => {
                let proceeds = record.realized_proceeds.unwrap_or(self.config.wager);
                self.pricing.qty_for_notional(proceeds, price, Side::Buy)
            }
        };
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            side: entry_side.opposite(),
            price,
            quantity,
            client_id: record.client_id.clone(),
        };
        match transport.create_limit_order(&request).await {
            Ok(()) => {
                info!(
                    client_id = %request.client_id,
                    anchor = record.anchor_price,
                    price,
                    quantity,
                    "placed tier take-profit"
                );
                Some(OrderRecord::pending_take_profit(
                    &request,
                    record.anchor_price,
                    record.realized_proceeds,
                    record.position_index,
                ))
            }
            Err(e) => {
                warn!(client_id = %record.client_id, error = %e, "take-profit placement failed");
                Some(record)
            }
        }
    }

    /// Re-enter a completed cycle at the tier's current price, compounding
    /// the recovered value, and count the profit cycle.
    async fn reenter(
        &mut self,
        transport: &dyn Transport,
        record: OrderRecord,
        mid: f64,
    ) -> Option<OrderRecord> {
        let side = record.client_id.entry_side();
        let index = record.position_index;
        let price = self.tier_price(mid, side, index);
        let quantity = match side {
            Side::Buy => {
                let notional = record.realized_proceeds.unwrap_or(self.config.wager);
                self.pricing.qty_for_notional(notional, price, Side::Buy)
            }
            // The take-profit bought this much base back; sell it again.
            Side::Sell => record.quantity,
        };
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            side,
            price,
            quantity,
            client_id: record.client_id.clone(),
        };
        match transport.create_limit_order(&request).await {
            Ok(()) => {
                match side {
                    Side::Buy => self.buy_profit_cycles += 1,
                    Side::Sell => self.sell_profit_cycles += 1,
                }
                info!(client_id = %request.client_id, price, quantity, tier = index, "tier cycle complete, re-entered");
                Some(OrderRecord::pending_entry(&request, index))
            }
            Err(e) => {
                warn!(client_id = %record.client_id, error = %e, "tier re-entry failed");
                Some(record)
            }
        }
    }

    /// Apply a user-stream event for one of this ladder's orders.
    ///
    /// Entry fills trigger the take-profit leg immediately rather than
    /// waiting for the next reprice tick.
    pub async fn handle_event(
        &mut self,
        transport: &dyn Transport,
        event: &OrderEvent,
        client_id: &ClientOrderId,
    ) {
        let slots = match client_id.entry_side() {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        };
        let Some(index) = slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|r| &r.client_id == client_id))
        else {
            debug!(client_id = %client_id, "event for unknown tier order");
            return;
        };

        let prior = slots[index].as_ref();
        let Some(next) = OrderRecord::transition(event, client_id, prior) else {
            return;
        };
        debug!(client_id = %client_id, state = ?next.state, "tier order transition");

        let next = if next.state == LifecycleState::EntryFilled {
            self.place_take_profit(transport, next).await
        } else {
            Some(next)
        };
        let slots = match client_id.entry_side() {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        };
        slots[index] = next;
    }
}
