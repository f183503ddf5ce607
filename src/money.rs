//! Settlement-currency arithmetic.
//!
//! Amounts are `f64` in the single settlement currency. Every value written to
//! the store passes through [`round2`] so float noise never accumulates in a
//! balance column.

use crate::ledger_constants::SETTLEMENT_EPSILON;

/// Round to 2 decimal places (cents).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to 6 decimal places, used before epsilon comparisons.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// `amount * pct / 100`, rounded to cents.
pub fn percent_of(amount: f64, pct: f64) -> f64 {
    round2(amount * pct / 100.0)
}

/// True when a residual is small enough to be treated as fully settled.
pub fn is_settled(residual: f64) -> bool {
    round6(residual).abs() < SETTLEMENT_EPSILON
}
