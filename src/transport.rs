//! Transport seam consumed by the core.
//!
//! The real venue client (REST calls plus push-socket management) lives
//! outside this crate; everything the engines need from it is captured by the
//! [`Transport`] trait. [`crate::sim::SimExchange`] provides an in-process
//! implementation for tests and paper trading.

use async_trait::async_trait;

use crate::client_id::ClientOrderId;
use crate::errors::Result;
use crate::types::{DepthSnapshot, OrderStatus, Side};

/// A limit order submission.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub client_id: ClientOrderId,
}

/// An order reported by the venue's open-orders query at startup.
///
/// The client id is the raw wire string here; orders not carrying one of our
/// structured ids are skipped during reload.
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub status: OrderStatus,
    pub client_id: String,
}

/// Venue operations the core depends on.
///
/// Errors from `create_limit_order`/`cancel_order` mean the action did not
/// happen; callers log and leave their local state untouched so the next
/// reprice cycle retries. Nothing here is retried in place.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a point-in-time book snapshot `depth` levels deep.
    async fn fetch_snapshot(&self, symbol: &str, depth: usize) -> Result<DepthSnapshot>;

    /// Submit a GTC limit order. An `Err` means the order is not resting.
    async fn create_limit_order(&self, request: &OrderRequest) -> Result<()>;

    /// Cancel a resting order by client id.
    async fn cancel_order(&self, symbol: &str, client_id: &ClientOrderId) -> Result<()>;

    /// List currently open orders for the symbol (startup reload).
    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>>;

    /// Tear down and re-establish the user event stream.
    async fn reconnect_user_stream(&self) -> Result<()>;
}
