use serde::{Deserialize, Serialize};

/// Side of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side. A take-profit leg always rests on the opposite
    /// side of its entry.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Lowercase tag used inside client order ids.
    pub fn tag(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Parse the client-order-id role tag ("buy"/"sell").
    pub fn from_tag(s: &str) -> Option<Side> {
        match s {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_tag_round_trip() {
        assert_eq!(Side::from_tag(Side::Buy.tag()), Some(Side::Buy));
        assert_eq!(Side::from_tag(Side::Sell.tag()), Some(Side::Sell));
        assert_eq!(Side::from_tag("BUY"), None);
    }
}
