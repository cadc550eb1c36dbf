//! Phase-2 price-grid ladder.
//!
//! Once the tier ladder has walked every tier into its take-profit leg, the
//! window between the nearest resting take-profits is dead ground the primary
//! strategy no longer trades. The grid ladder fills it: a fixed multiplicative
//! price grid is anchored on the window's lower bound and entries are placed
//! on the grid levels nearest the mid, each with its own take-profit one
//! configured margin away. The grid deactivates (cancelling untouched
//! entries) as soon as the window closes.

use tracing::{debug, info, warn};

use crate::client_id::{ClientOrderId, StrategyTag};
use crate::consts::EPSILON;
use crate::record::{LifecycleState, OrderRecord};
use crate::transport::{OrderRequest, Transport};
use crate::types::{OrderEvent, Side};

use super::config::{GridLadderConfig, Pricing};

/// Immutable price grid, generated once from its anchor.
///
/// Levels are multiplicative steps of `interval` around the anchor, rounded
/// to price precision, sorted ascending. Re-anchoring mid-session would
/// orphan resting orders from their levels, so the grid is never rebuilt.
#[derive(Debug, Default)]
pub struct GridLevels {
    levels: Vec<f64>,
}

impl GridLevels {
    /// Build the grid around `anchor` with `span` steps on each side.
    pub fn populate(anchor: f64, interval: f64, span: usize, pricing: &Pricing) -> Self {
        let mut levels = Vec::with_capacity(span * 2 + 1);
        levels.push(pricing.round_price(anchor));
        let mut up = anchor;
        let mut down = anchor;
        for _ in 0..span {
            up *= 1.0 + interval;
            down *= 1.0 - interval;
            levels.push(pricing.round_price(up));
            if down > 0.0 {
                levels.push(pricing.round_price(down));
            }
        }
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup_by(|a, b| (*a - *b).abs() < EPSILON);
        Self { levels }
    }

    #[cfg(test)]
    pub fn from_levels(mut levels: Vec<f64>) -> Self {
        levels.sort_by(|a, b| a.total_cmp(b));
        Self { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Grid level closest to `target`.
    pub fn nearest(&self, target: f64) -> Option<f64> {
        self.levels
            .iter()
            .copied()
            .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
    }

    pub fn contains(&self, price: f64) -> bool {
        self.levels.iter().any(|x| (x - price).abs() < EPSILON)
    }

    /// Levels in `[low, high)`, ascending.
    fn in_range(&self, low: f64, high: f64) -> impl Iterator<Item = f64> + '_ {
        self.levels
            .iter()
            .copied()
            .filter(move |x| *x >= low && *x < high)
    }
}

/// Price-grid ladder engine.
#[derive(Debug)]
pub struct GridLadderEngine {
    config: GridLadderConfig,
    pricing: Pricing,
    symbol: String,
    active: bool,
    levels: GridLevels,
    buys: Vec<OrderRecord>,
    sells: Vec<OrderRecord>,
    buy_profit_cycles: u64,
    sell_profit_cycles: u64,
}

impl GridLadderEngine {
    pub fn new(symbol: impl Into<String>, config: GridLadderConfig, pricing: Pricing) -> Self {
        Self {
            config,
            pricing,
            symbol: symbol.into(),
            active: false,
            levels: GridLevels::default(),
            buys: Vec::new(),
            sells: Vec::new(),
            buy_profit_cycles: 0,
            sell_profit_cycles: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn buy_orders(&self) -> &[OrderRecord] {
        &self.buys
    }

    pub fn sell_orders(&self) -> &[OrderRecord] {
        &self.sells
    }

    /// Completed grid cycles per side since startup.
    pub fn profit_cycles(&self) -> (u64, u64) {
        (self.buy_profit_cycles, self.sell_profit_cycles)
    }

    pub fn has_settling(&self) -> bool {
        self.buys
            .iter()
            .chain(self.sells.iter())
            .any(|r| r.state.is_settling())
    }

    /// Run the grid inside the take-profit window `(lower, upper)`.
    ///
    /// Anchors the grid on first activation, re-snaps off-grid take-profit
    /// anchors, then tops up each side with entries on the free grid levels
    /// nearest the mid. Entries whose take-profit would land outside the
    /// window are not placed.
    pub async fn activate(&mut self, transport: &dyn Transport, mid: f64, lower: f64, upper: f64) {
        if self.levels.is_empty() {
            self.levels = GridLevels::populate(
                lower,
                self.config.interval,
                self.config.level_span,
                &self.pricing,
            );
            info!(anchor = lower, "grid anchored");
        }
        if !self.active {
            info!(mid, lower, upper, "grid activated");
        }
        self.active = true;

        self.snap_anchors();
        self.top_up_side(transport, Side::Buy, mid, lower, upper).await;
        self.top_up_side(transport, Side::Sell, mid, lower, upper).await;
    }

    /// Cancel untouched grid entries and stop placing. Partially-filled
    /// entries and resting take-profits are kept and keep receiving events.
    pub async fn deactivate(&mut self, transport: &dyn Transport) {
        if !self.active {
            return;
        }
        info!("grid deactivated");
        self.active = false;
        for records in [&mut self.buys, &mut self.sells] {
            let mut kept = Vec::with_capacity(records.len());
            for record in records.drain(..) {
                if !matches!(
                    record.state,
                    LifecycleState::EntryPending | LifecycleState::EntryOpen
                ) {
                    kept.push(record);
                    continue;
                }
                match transport.cancel_order(&self.symbol, &record.client_id).await {
                    Ok(()) => {
                        debug!(client_id = %record.client_id, "cancelled grid entry");
                    }
                    Err(e) => {
                        warn!(client_id = %record.client_id, error = %e, "grid cancel failed, keeping order");
                        kept.push(record);
                    }
                }
            }
            *records = kept;
        }
    }

    /// Re-snap take-profit anchors that are off-grid.
    ///
    /// Orders reloaded at startup carry no anchor; recover it from the
    /// take-profit price and pin it to the nearest grid level so the level
    /// reads as occupied.
    fn snap_anchors(&mut self) {
        let (levels, pricing, config) = (&self.levels, &self.pricing, &self.config);
        for record in self.buys.iter_mut().chain(self.sells.iter_mut()) {
            if !record.state.is_take_profit() {
                continue;
            }
            if record.anchor_price > 0.0 && levels.contains(record.anchor_price) {
                continue;
            }
            let target = match record.client_id.entry_side() {
                Side::Buy => record.price / (1.0 + config.take_profit_margin),
                Side::Sell => record.price / (1.0 - config.take_profit_margin),
            };
            if let Some(level) = levels.nearest(target) {
                debug!(client_id = %record.client_id, target, level, "snapped grid anchor");
                record.anchor_price = pricing.round_price(level);
            }
        }
    }

    /// Grid levels on `side` that are free to take an entry, nearest the mid
    /// first.
    fn candidate_levels(&self, side: Side, mid: f64, lower: f64, upper: f64) -> Vec<f64> {
        let reach = self.config.interval * self.config.max_per_side as f64;
        let tp = self.config.take_profit_margin;
        let mid_rounded = self.pricing.round_price(mid);

        let records = match side {
            Side::Buy => &self.buys,
            Side::Sell => &self.sells,
        };
        let occupied = |x: f64| {
            records.iter().any(|r| {
                // A completed cycle no longer holds its level; the re-entry
                // pass is free to take it again.
                if r.state == LifecycleState::TakeProfitFilled {
                    return false;
                }
                let held = if r.state.is_entry() { r.price } else { r.anchor_price };
                (held - x).abs() < EPSILON
            })
        };

        let mut candidates: Vec<f64> = match side {
            Side::Buy => self
                .levels
                .in_range(mid * (1.0 - reach), mid_rounded)
                .filter(|x| *x > lower && x * (1.0 + tp) < upper)
                .filter(|x| !occupied(*x))
                .collect(),
            Side::Sell => self
                .levels
                .in_range(mid_rounded + EPSILON, mid * (1.0 + reach))
                .filter(|x| *x < upper && x * (1.0 - tp) > lower)
                .filter(|x| !occupied(*x))
                .collect(),
        };
        match side {
            // Closest to the mid first.
            Side::Buy => candidates.sort_by(|a, b| b.total_cmp(a)),
            Side::Sell => candidates.sort_by(|a, b| a.total_cmp(b)),
        }
        candidates
    }

    async fn top_up_side(
        &mut self,
        transport: &dyn Transport,
        side: Side,
        mid: f64,
        lower: f64,
        upper: f64,
    ) {
        for price in self.candidate_levels(side, mid, lower, upper) {
            if self.reenter_completed(transport, side, price).await {
                continue;
            }
            let records_len = match side {
                Side::Buy => self.buys.len(),
                Side::Sell => self.sells.len(),
            };
            if records_len < self.config.max_per_side {
                self.place_entry(transport, side, price).await;
            } else if !self.move_worst_entry(transport, side, price).await {
                // No worse order to displace; further candidates are worse.
                break;
            }
        }
    }

    /// Re-enter the oldest completed cycle on `side` at `price`, reusing its
    /// client id and compounding the recovered value. Returns whether a
    /// completed cycle was consumed.
    async fn reenter_completed(&mut self, transport: &dyn Transport, side: Side, price: f64) -> bool {
        let records = match side {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        };
        let Some(index) = records
            .iter()
            .position(|r| r.state == LifecycleState::TakeProfitFilled)
        else {
            return false;
        };
        let record = records[index].clone();
        let quantity = match side {
            Side::Buy => {
                let notional = record.realized_proceeds.unwrap_or(self.config.wager);
                self.pricing.qty_for_notional(notional, price, Side::Buy)
            }
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
                info!(client_id = %request.client_id, price, quantity, "grid cycle re-entered");
                let slot = match side {
                    Side::Buy => &mut self.buys[index],
                    Side::Sell => &mut self.sells[index],
                };
                *slot = OrderRecord::pending_entry(&request, 0);
            }
            Err(e) => {
                warn!(client_id = %record.client_id, error = %e, "grid re-entry failed");
            }
        }
        // Consumed the candidate either way; a failed placement retries on
        // the next activation pass.
        true
    }

    async fn place_entry(&mut self, transport: &dyn Transport, side: Side, price: f64) {
        let quantity = self.pricing.qty_for_notional(self.config.wager, price, side);
        if quantity <= 0.0 {
            warn!(price, "grid wager too small for lot precision");
            return;
        }
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            side,
            price,
            quantity,
            client_id: ClientOrderId::new(StrategyTag::Grid, side),
        };
        match transport.create_limit_order(&request).await {
            Ok(()) => {
                info!(client_id = %request.client_id, price, quantity, "placed grid entry");
                let record = OrderRecord::pending_entry(&request, 0);
                match side {
                    Side::Buy => self.buys.push(record),
                    Side::Sell => self.sells.push(record),
                }
            }
            Err(e) => {
                warn!(price, error = %e, "grid entry placement failed");
            }
        }
    }

    /// Displace the resting entry furthest from the mid to `price`, carrying
    /// its notional. Returns whether an order was moved.
    async fn move_worst_entry(&mut self, transport: &dyn Transport, side: Side, price: f64) -> bool {
        let records = match side {
            Side::Buy => &self.buys,
            Side::Sell => &self.sells,
        };
        let worst = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == LifecycleState::EntryOpen)
            .filter(|(_, r)| match side {
                Side::Buy => r.price < price,
                Side::Sell => r.price > price,
            })
            .min_by(|(_, a), (_, b)| match side {
                Side::Buy => a.price.total_cmp(&b.price),
                Side::Sell => b.price.total_cmp(&a.price),
            });
        let Some((index, record)) = worst.map(|(i, r)| (i, r.clone())) else {
            return false;
        };

        if let Err(e) = transport.cancel_order(&self.symbol, &record.client_id).await {
            warn!(client_id = %record.client_id, error = %e, "grid move cancel failed");
            return true;
        }
        let notional = self.pricing.notional(record.price, record.quantity, side);
        let quantity = self.pricing.qty_for_notional(notional, price, side);
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            side,
            price,
            quantity,
            client_id: ClientOrderId::new(StrategyTag::Grid, side),
        };
        match transport.create_limit_order(&request).await {
            Ok(()) => {
                info!(from = record.price, to = price, "moved grid entry toward mid");
                let slot = match side {
                    Side::Buy => &mut self.buys[index],
                    Side::Sell => &mut self.sells[index],
                };
                *slot = OrderRecord::pending_entry(&request, 0);
            }
            Err(e) => {
                warn!(error = %e, "grid move replace failed");
                let records = match side {
                    Side::Buy => &mut self.buys,
                    Side::Sell => &mut self.sells,
                };
                records.remove(index);
            }
        }
        true
    }

    /// Take-profit price for a grid entry anchored at `anchor`.
    fn take_profit_price(&self, anchor: f64, entry_side: Side) -> f64 {
        let raw = match entry_side {
            Side::Buy => anchor * (1.0 + self.config.take_profit_margin),
            Side::Sell => anchor * (1.0 - self.config.take_profit_margin),
        };
        self.pricing.round_price(raw)
    }

    async fn place_take_profit(
        &self,
        transport: &dyn Transport,
        record: OrderRecord,
    ) -> OrderRecord {
        let entry_side = record.client_id.entry_side();
        let price = self.take_profit_price(record.anchor_price, entry_side);
        let quantity = match entry_side {
            Side::Buy => record.quantity,
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
                info!(client_id = %request.client_id, anchor = record.anchor_price, price, "placed grid take-profit");
                OrderRecord::pending_take_profit(
                    &request,
                    record.anchor_price,
                    record.realized_proceeds,
                    0,
                )
            }
            Err(e) => {
                warn!(client_id = %record.client_id, error = %e, "grid take-profit placement failed");
                record
            }
        }
    }

    /// Apply a user-stream event for one of this ladder's orders.
    pub async fn handle_event(
        &mut self,
        transport: &dyn Transport,
        event: &OrderEvent,
        client_id: &ClientOrderId,
    ) {
        let records = match client_id.entry_side() {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        };
        let Some(index) = records.iter().position(|r| &r.client_id == client_id) else {
            debug!(client_id = %client_id, "event for unknown grid order");
            return;
        };

        let prior = &records[index];
        let Some(next) = OrderRecord::transition(event, client_id, Some(prior)) else {
            return;
        };
        debug!(client_id = %client_id, state = ?next.state, "grid order transition");
        if next.state == LifecycleState::TakeProfitFilled && prior.state != LifecycleState::TakeProfitFilled
        {
            match client_id.entry_side() {
                Side::Buy => self.buy_profit_cycles += 1,
                Side::Sell => self.sell_profit_cycles += 1,
            }
        }

        let next = if next.state == LifecycleState::EntryFilled {
            self.place_take_profit(transport, next).await
        } else {
            next
        };
        let records = match client_id.entry_side() {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        };
        records[index] = next;
    }

    /// Adopt or discard an order reloaded from the venue at startup.
    ///
    /// Resting grid entries from a previous run sit on a grid this run never
    /// anchored, so they are cancelled; anything with a fill (partials and
    /// take-profit legs) is kept and tracked to completion.
    pub async fn restore(&mut self, transport: &dyn Transport, record: OrderRecord) {
        if record.state == LifecycleState::EntryOpen {
            match transport.cancel_order(&self.symbol, &record.client_id).await {
                Ok(()) => {
                    info!(client_id = %record.client_id, "cancelled stale grid entry");
                    return;
                }
                Err(e) => {
                    warn!(client_id = %record.client_id, error = %e, "stale grid cancel failed, tracking order");
                }
            }
        }
        info!(client_id = %record.client_id, state = ?record.state, "restored grid order");
        match record.client_id.entry_side() {
            Side::Buy => self.buys.push(record),
            Side::Sell => self.sells.push(record),
        }
    }
}
