//! Wire-facing data types shared across the crate.

mod book;
mod common;
mod events;

pub use book::{DepthDelta, DepthSnapshot, PriceLevel};
pub use common::Side;
pub use events::{ExecutionType, OrderEvent, OrderStatus};
