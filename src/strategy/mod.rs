//! Ladder strategies and the control loop that drives them.
//!
//! Two engines place orders: the fixed-tier ladder ([`tier`]) runs
//! continuously, and the price-grid ladder ([`grid`]) activates only inside
//! the profit window the tier ladder leaves open. [`coordinator`] owns both
//! and multiplexes depth updates, user events and the reprice timer.

pub mod config;
pub mod coordinator;
pub mod grid;
pub mod tier;


pub use config::{EngineConfig, GridLadderConfig, Pricing, TierLadderConfig};
pub use coordinator::ExecutionCoordinator;
pub use grid::GridLadderEngine;
pub use tier::TierLadderEngine;
