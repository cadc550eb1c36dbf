//! Structured client order ids.
//!
//! Every order this system places carries a `{strategy}_{role}_{suffix}` id.
//! The strategy tag routes user-stream events to the owning ladder engine and
//! the role tag records which side originated the position (a take-profit leg
//! rests on the opposite side of its role). The id is validated once at
//! construction/parse time and never string-split downstream.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use uuid::Uuid;

use crate::errors::Error;
use crate::types::Side;

/// Which ladder engine owns an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyTag {
    /// Phase-1 fixed-tier ladder.
    Primary,
    /// Phase-2 price-grid ladder.
    Grid,
}

impl StrategyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyTag::Primary => "primary",
            StrategyTag::Grid => "grid",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(StrategyTag::Primary),
            "grid" => Some(StrategyTag::Grid),
            _ => None,
        }
    }
}

/// A validated client order id.
///
/// The wire form is `{strategy}_{role}_{suffix}` where the suffix is a
/// base64-encoded random id with `=`, `+` and `/` stripped, so `_` remains
/// the only separator. The id stays stable for the life of an order and is
/// reused when a completed take-profit cycle re-enters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientOrderId {
    strategy: StrategyTag,
    entry_side: Side,
    suffix: String,
}

impl ClientOrderId {
    /// Generate a fresh id with a random unique suffix.
    pub fn new(strategy: StrategyTag, entry_side: Side) -> Self {
        let suffix: String = STANDARD
            .encode(Uuid::new_v4().as_bytes())
            .chars()
            .filter(|c| !matches!(c, '=' | '+' | '/'))
            .collect();
        Self {
            strategy,
            entry_side,
            suffix,
        }
    }

    /// Owning ladder engine.
    pub fn strategy(&self) -> StrategyTag {
        self.strategy
    }

    /// Side that originated the position. The order's *current* side differs
    /// from this while a take-profit leg is resting.
    pub fn entry_side(&self) -> Side {
        self.entry_side
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.strategy.as_str(),
            self.entry_side.tag(),
            self.suffix
        )
    }
}

impl FromStr for ClientOrderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '_');
        let (strategy, role, suffix) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return Err(Error::InvalidClientId(s.to_string())),
        };

        let strategy =
            StrategyTag::parse(strategy).ok_or_else(|| Error::InvalidClientId(s.to_string()))?;
        let entry_side =
            Side::from_tag(role).ok_or_else(|| Error::InvalidClientId(s.to_string()))?;
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidClientId(s.to_string()));
        }

        Ok(Self {
            strategy,
            entry_side,
            suffix: suffix.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parse_round_trip() {
        let id = ClientOrderId::new(StrategyTag::Primary, Side::Buy);
        let parsed: ClientOrderId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.strategy(), StrategyTag::Primary);
        assert_eq!(parsed.entry_side(), Side::Buy);
    }

    #[test]
    fn test_suffix_has_no_base64_padding_chars() {
        for _ in 0..50 {
            let id = ClientOrderId::new(StrategyTag::Grid, Side::Sell);
            assert!(id.suffix().chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(!id.suffix().is_empty());
        }
    }

    #[test]
    fn test_unique_suffixes() {
        let a = ClientOrderId::new(StrategyTag::Primary, Side::Buy);
        let b = ClientOrderId::new(StrategyTag::Primary, Side::Buy);
        assert_ne!(a.suffix(), b.suffix());
    }

    #[test]
    fn test_rejects_foreign_ids() {
        assert!("web_buy_abc".parse::<ClientOrderId>().is_err());
        assert!("primary_hold_abc".parse::<ClientOrderId>().is_err());
        assert!("primary_buy".parse::<ClientOrderId>().is_err());
        assert!("primary_buy_".parse::<ClientOrderId>().is_err());
        assert!("".parse::<ClientOrderId>().is_err());
    }

    #[test]
    fn test_grid_wire_format() {
        let id: ClientOrderId = "grid_sell_AbC123xYz".parse().unwrap();
        assert_eq!(id.strategy(), StrategyTag::Grid);
        assert_eq!(id.entry_side(), Side::Sell);
        assert_eq!(id.to_string(), "grid_sell_AbC123xYz");
    }
}
