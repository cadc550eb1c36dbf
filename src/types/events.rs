//! User-stream order/trade event types.

use serde::{Deserialize, Serialize};

use super::Side;

/// What kind of execution report this event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    /// Order accepted by the venue.
    New,
    /// A trade occurred against the order (partial or full).
    Trade,
    Cancelled,
    Rejected,
    Expired,
}

/// Venue-reported order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

/// A single order update from the user event stream.
///
/// `client_id` round-trips exactly as submitted and is the routing key for
/// everything downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub execution_type: ExecutionType,
    pub status: OrderStatus,
    pub side: Side,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub client_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_json_event() {
        let event: OrderEvent = serde_json::from_str(
            r#"{
                "execution_type": "TRADE",
                "status": "PARTIALLY_FILLED",
                "side": "BUY",
                "symbol": "XLMUSDT",
                "price": 0.09981,
                "quantity": 120.2,
                "client_id": "primary_buy_Ab3xY9"
            }"#,
        )
        .unwrap();
        assert_eq!(event.execution_type, ExecutionType::Trade);
        assert_eq!(event.status, OrderStatus::PartiallyFilled);
        assert_eq!(event.side, Side::Buy);
        assert_eq!(event.client_id, "primary_buy_Ab3xY9");
    }

    #[test]
    fn test_status_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap(),
            "\"PARTIALLY_FILLED\""
        );
        assert_eq!(
            serde_json::to_string(&ExecutionType::New).unwrap(),
            "\"NEW\""
        );
    }
}
