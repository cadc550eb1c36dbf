//! Two-phase ladder trading engine.
//!
//! The crate keeps a locally synchronized order book ([`depth`]), tracks
//! every order it places through an explicit lifecycle ([`record`]), and
//! runs two ladder strategies over them ([`strategy`]): a fixed-tier ladder
//! that brackets the mid continuously, and a price-grid ladder that trades
//! the window left open once every tier has reached its take-profit leg.
//! All venue access goes through the [`transport::Transport`] seam;
//! [`sim::SimExchange`] implements it in-process for tests and paper runs.

pub mod client_id;
mod consts;
pub mod depth;
pub mod errors;
mod helpers;
pub mod record;
pub mod sim;
pub mod strategy;
pub mod transport;
pub mod types;

pub use client_id::{ClientOrderId, StrategyTag};
pub use consts::EPSILON;
pub use depth::{run_depth_consumer, DepthCache};
pub use errors::{Error, Result};
pub use helpers::round_dp;
pub use record::{LifecycleState, OrderRecord};
pub use sim::SimExchange;
pub use strategy::{
    EngineConfig, ExecutionCoordinator, GridLadderConfig, GridLadderEngine, Pricing,
    TierLadderConfig, TierLadderEngine,
};
pub use transport::{OpenOrder, OrderRequest, Transport};
