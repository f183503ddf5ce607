//! Commission percentage per referral depth.

use crate::ledger_constants::{
    DIRECT_BONUS_PCT, LOWER_INDIRECT_BONUS_PCT, MAX_COMMISSION_DEPTH, UPPER_INDIRECT_BONUS_PCT,
};

/// Percentage paid to the referrer `level` steps above the purchaser.
/// Level 1 is the direct upline; anything outside 1..=10 earns nothing.
pub fn bonus_percentage(level: usize) -> f64 {
    match level {
        1 => DIRECT_BONUS_PCT,
        2..=4 => UPPER_INDIRECT_BONUS_PCT,
        5..=MAX_COMMISSION_DEPTH => LOWER_INDIRECT_BONUS_PCT,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers() {
        let table: Vec<f64> = (1..=10).map(bonus_percentage).collect();
        assert_eq!(table, vec![10.0, 1.5, 1.5, 1.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(bonus_percentage(0), 0.0);
        assert_eq!(bonus_percentage(11), 0.0);
    }
}
