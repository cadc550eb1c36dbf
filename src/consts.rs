/// Tolerance for floating point comparisons on prices and quantities.
pub const EPSILON: f64 = 1e-9;
