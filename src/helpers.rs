//! Small numeric helpers shared by the depth cache and the ladder engines.

/// Round a value to `digits` decimal places.
///
/// Prices and quantities submitted to the venue must respect its tick and lot
/// precision; every outbound price/qty goes through this.
pub fn round_dp(value: f64, digits: u32) -> f64 {
    let factor = 10_f64.powi(digits as i32);
    (value * factor).round() / factor
}
