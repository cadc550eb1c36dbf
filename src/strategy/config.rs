//! Configuration for the ladder engines and the coordinator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::helpers::round_dp;
use crate::types::Side;

/// Phase-1 fixed-tier ladder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLadderConfig {
    /// Number of tiers placed on either side of the mid.
    pub tiers: usize,
    /// Base margin per tier, as a fraction of mid.
    pub margin: f64,
    /// Strictly-increasing distance multipliers, one per tier (extra entries
    /// are ignored).
    pub tier_multipliers: Vec<f64>,
    /// Mid movement (fractional) beyond which resting entries are moved.
    pub move_threshold: f64,
    /// Quote-currency notional per fresh entry.
    pub wager: f64,
    /// Take-profit distance from the entry fill, as a fraction.
    pub take_profit_margin: f64,
}

impl Default for TierLadderConfig {
    fn default() -> Self {
        Self {
            tiers: 5,
            margin: 0.0022,
            tier_multipliers: vec![1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.3, 4.6, 4.9, 5.2, 5.5],
            move_threshold: 0.0008,
            wager: 12.0,
            take_profit_margin: 0.007,
        }
    }
}

/// Phase-2 price-grid ladder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLadderConfig {
    /// Fixed fractional step between adjacent grid levels.
    pub interval: f64,
    /// Maximum simultaneously open entry orders per side.
    pub max_per_side: usize,
    /// Take-profit distance from the entry fill, as a fraction.
    pub take_profit_margin: f64,
    /// Quote-currency notional per fresh entry.
    pub wager: f64,
    /// Number of grid steps generated on each side of the anchor.
    pub level_span: usize,
}

impl Default for GridLadderConfig {
    fn default() -> Self {
        Self {
            interval: 0.005,
            max_per_side: 5,
            take_profit_margin: 0.0075,
            wager: 14.0,
            level_span: 62,
        }
    }
}

/// Venue precision and fee parameters shared by both engines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
    pub price_decimals: u32,
    pub qty_decimals: u32,
    /// Trading fee as a fraction; folded into sizing so a cycle returns its
    /// full notional after fees.
    pub fee_pct: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            price_decimals: 5,
            qty_decimals: 1,
            fee_pct: 0.0,
        }
    }
}

impl Pricing {
    pub fn round_price(&self, price: f64) -> f64 {
        round_dp(price, self.price_decimals)
    }

    pub fn round_qty(&self, qty: f64) -> f64 {
        round_dp(qty, self.qty_decimals)
    }

    /// Fee factor applied to a side's notional: buys pay the fee on top,
    /// sells recover less.
    fn fee_factor(&self, side: Side) -> f64 {
        match side {
            Side::Buy => 1.0 + self.fee_pct,
            Side::Sell => 1.0 - self.fee_pct,
        }
    }

    /// Quantity that spends `notional` at `price` on `side`, fee-adjusted
    /// and rounded to lot precision.
    pub fn qty_for_notional(&self, notional: f64, price: f64, side: Side) -> f64 {
        self.round_qty(notional / (price * self.fee_factor(side)))
    }

    /// Fee-adjusted notional value of a resting order, used to preserve
    /// value across a cancel/replace.
    pub fn notional(&self, price: f64, qty: f64, side: Side) -> f64 {
        price * self.fee_factor(side) * qty
    }
}

/// Top-level engine configuration, TOML-loadable for the paper binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Market symbol, e.g. "XLMUSDT".
    pub symbol: String,
    /// Depth of the initial REST book snapshot.
    pub snapshot_depth: usize,
    pub pricing: Pricing,
    /// Delay between Phase-1 repricing cycles, in milliseconds.
    pub reprice_interval_ms: u64,
    /// Maximum user-stream age before a reconnect is attempted, in seconds.
    pub stream_max_age_secs: u64,
    /// Disable the Phase-2 grid ladder entirely.
    pub mute_grid: bool,
    pub tier: TierLadderConfig,
    pub grid: GridLadderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "XLMUSDT".to_string(),
            snapshot_depth: 100,
            pricing: Pricing::default(),
            reprice_interval_ms: 1200,
            stream_max_age_secs: 45 * 60,
            mute_grid: false,
            tier: TierLadderConfig::default(),
            grid: GridLadderConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn reprice_interval(&self) -> Duration {
        Duration::from_millis(self.reprice_interval_ms)
    }

    pub fn stream_max_age(&self) -> Duration {
        Duration::from_secs(self.stream_max_age_secs)
    }

    /// Reject configurations the engines cannot run on.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(Error::Config("symbol must not be empty".to_string()));
        }
        if self.tier.tiers == 0 {
            return Err(Error::Config("tier count must be positive".to_string()));
        }
        if self.tier.tier_multipliers.len() < self.tier.tiers {
            return Err(Error::Config(format!(
                "need at least {} tier multipliers, got {}",
                self.tier.tiers,
                self.tier.tier_multipliers.len()
            )));
        }
        if !self
            .tier
            .tier_multipliers
            .windows(2)
            .all(|w| w[1] > w[0])
        {
            return Err(Error::Config(
                "tier multipliers must be strictly increasing".to_string(),
            ));
        }
        for (name, value) in [
            ("tier margin", self.tier.margin),
            ("tier move threshold", self.tier.move_threshold),
            ("tier wager", self.tier.wager),
            ("tier take-profit margin", self.tier.take_profit_margin),
            ("grid interval", self.grid.interval),
            ("grid wager", self.grid.wager),
            ("grid take-profit margin", self.grid.take_profit_margin),
        ] {
            if value <= 0.0 {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        if self.grid.max_per_side == 0 || self.grid.level_span == 0 {
            return Err(Error::Config(
                "grid max_per_side and level_span must be positive".to_string(),
            ));
        }
        if self.reprice_interval_ms == 0 {
            return Err(Error::Config("reprice interval must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_non_increasing_multipliers() {
        let mut config = EngineConfig::default();
        config.tier.tier_multipliers = vec![1.0, 1.0, 2.0, 3.0, 4.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_too_few_multipliers() {
        let mut config = EngineConfig::default();
        config.tier.tiers = 6;
        config.tier.tier_multipliers = vec![1.0, 2.0, 3.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_qty_for_notional_with_fee() {
        let pricing = Pricing {
            price_decimals: 5,
            qty_decimals: 4,
            fee_pct: 0.001,
        };
        // Buys pay the fee on top of the price.
        let qty = pricing.qty_for_notional(12.0, 0.1, Side::Buy);
        assert!((qty - round_dp(12.0 / (0.1 * 1.001), 4)).abs() < 1e-12);
        // Sells recover less per unit.
        let qty = pricing.qty_for_notional(12.0, 0.1, Side::Sell);
        assert!((qty - round_dp(12.0 / (0.1 * 0.999), 4)).abs() < 1e-12);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.symbol, config.symbol);
        assert_eq!(parsed.tier.tiers, config.tier.tiers);
        assert_eq!(parsed.grid.max_per_side, config.grid.max_per_side);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: EngineConfig = toml::from_str("symbol = \"BTCUSDT\"").unwrap();
        assert_eq!(parsed.symbol, "BTCUSDT");
        assert_eq!(parsed.tier.tiers, TierLadderConfig::default().tiers);
    }
}
