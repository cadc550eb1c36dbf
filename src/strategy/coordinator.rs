//! Control loop tying the depth cache, the user stream and the engines
//! together.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::MissedTickBehavior;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::client_id::{ClientOrderId, StrategyTag};
use crate::depth::DepthCache;
use crate::errors::Result;
use crate::record::OrderRecord;
use crate::transport::Transport;
use crate::types::OrderEvent;

use super::config::EngineConfig;
use super::grid::GridLadderEngine;
use super::tier::TierLadderEngine;

/// Owns both ladder engines and multiplexes their inputs.
///
/// Single-threaded over its state: user-stream events and the reprice timer
/// are serialized through one `select!` loop, so the engines never see
/// concurrent mutation.
pub struct ExecutionCoordinator {
    transport: Arc<dyn Transport>,
    depth: Arc<DepthCache>,
    config: EngineConfig,
    tier: TierLadderEngine,
    grid: GridLadderEngine,
    events: UnboundedReceiver<OrderEvent>,
    /// When the user stream was (re)connected; stale streams are recycled.
    stream_connected_at: Instant,
}

impl ExecutionCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        depth: Arc<DepthCache>,
        config: EngineConfig,
        events: UnboundedReceiver<OrderEvent>,
    ) -> Result<Self> {
        config.validate()?;
        let tier = TierLadderEngine::new(&config.symbol, config.tier.clone(), config.pricing);
        let grid = GridLadderEngine::new(&config.symbol, config.grid.clone(), config.pricing);
        Ok(Self {
            transport,
            depth,
            config,
            tier,
            grid,
            events,
            stream_connected_at: Instant::now(),
        })
    }

    pub fn tier(&self) -> &TierLadderEngine {
        &self.tier
    }

    pub fn grid(&self) -> &GridLadderEngine {
        &self.grid
    }

    /// Prime the depth cache and reload orders left resting by a previous
    /// run, routing each to its owning engine by client-id tag.
    pub async fn initialize(&mut self) -> Result<()> {
        self.depth
            .initialize(
                self.transport.as_ref(),
                &self.config.symbol,
                self.config.snapshot_depth,
            )
            .await?;

        let open = self.transport.open_orders(&self.config.symbol).await?;
        info!(count = open.len(), "reloading open orders");
        for order in &open {
            let client_id: ClientOrderId = match order.client_id.parse() {
                Ok(id) => id,
                Err(_) => {
                    debug!(client_id = %order.client_id, "skipping foreign open order");
                    continue;
                }
            };
            let record = OrderRecord::from_open_order(order, client_id.clone(), 0);
            match client_id.strategy() {
                StrategyTag::Primary => self.tier.restore(record),
                StrategyTag::Grid => {
                    self.grid.restore(self.transport.as_ref(), record).await;
                }
            }
        }
        Ok(())
    }

    /// Run until the user-event channel closes.
    pub async fn run(&mut self) -> Result<()> {
        let mut reprice = tokio::time::interval(self.config.reprice_interval());
        reprice.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = self.events.recv() => {
                    match maybe_event {
                        Some(event) => self.route_event(event).await,
                        None => {
                            warn!("user event channel closed, stopping");
                            return Ok(());
                        }
                    }
                }
                _ = reprice.tick() => {
                    self.reprice_cycle().await;
                }
            }
        }
    }

    /// Deliver a user-stream event to the engine that owns the order.
    /// Events without one of our structured client ids are ignored.
    pub async fn route_event(&mut self, event: OrderEvent) {
        let client_id: ClientOrderId = match event.client_id.parse() {
            Ok(id) => id,
            Err(_) => {
                debug!(client_id = %event.client_id, "ignoring event for foreign order");
                return;
            }
        };
        match client_id.strategy() {
            StrategyTag::Primary => {
                self.tier
                    .handle_event(self.transport.as_ref(), &event, &client_id)
                    .await;
            }
            StrategyTag::Grid => {
                self.grid
                    .handle_event(self.transport.as_ref(), &event, &client_id)
                    .await;
            }
        }
    }

    /// Route every queued user event without waiting for new ones.
    #[cfg(test)]
    pub(crate) async fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.route_event(event).await;
        }
    }

    /// One timer tick: recycle a stale user stream, reprice the tier ladder,
    /// and open or close the grid according to the take-profit window.
    pub async fn reprice_cycle(&mut self) {
        self.check_user_stream().await;

        let mid = match self.depth.mid_price(&self.config.symbol) {
            Ok(mid) => mid,
            Err(e) => {
                warn!(error = %e, "no usable mid price, skipping reprice cycle");
                return;
            }
        };

        self.tier.reprice(self.transport.as_ref(), mid).await;

        let window = (self.tier.all_cycled() && !self.config.mute_grid)
            .then(|| self.tier.take_profit_window())
            .flatten();
        match window {
            Some((lower, upper)) => {
                self.grid
                    .activate(self.transport.as_ref(), mid, lower, upper)
                    .await;
            }
            None => self.grid.deactivate(self.transport.as_ref()).await,
        }
    }

    /// Recycle the user stream once it exceeds the configured age, but never
    /// while a fill is settling on either engine (the reconnect gap could
    /// drop its execution reports).
    async fn check_user_stream(&mut self) {
        if self.stream_connected_at.elapsed() < self.config.stream_max_age() {
            return;
        }
        if self.tier.has_settling() || self.grid.has_settling() {
            debug!("user stream stale but a fill is settling, deferring reconnect");
            return;
        }
        match self.transport.reconnect_user_stream().await {
            Ok(()) => {
                info!("user stream recycled");
                self.stream_connected_at = Instant::now();
            }
            Err(e) => {
                warn!(error = %e, "user stream reconnect failed");
            }
        }
    }
}
