//! Wallet Deduction Policy
//!
//! Spends are drawn in a fixed order: primary wallet, then primary earnings,
//! then referral bounty. Touching primary earnings marks the spend as a
//! reinvestment. Pure functions; persistence is the caller's job.

use serde::Serialize;

use super::Buckets;
use crate::error::{LedgerError, LedgerResult};
use crate::money::{is_settled, round2, round6};

/// Outcome of a deduction: new bucket values plus how the spend was sourced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Deduction {
    pub buckets: Buckets,
    pub from_wallet: f64,
    pub from_earnings: f64,
    pub from_bounty: f64,
    /// The primary wallet alone covered the spend
    pub is_from_wallet: bool,
    /// Some portion came out of primary earnings
    pub is_reinvestment: bool,
}

/// Take up to `available` from `remaining`, returning the amount taken.
fn take(remaining: &mut f64, available: f64) -> f64 {
    let taken = round2(remaining.min(available.max(0.0)));
    *remaining = round2(*remaining - taken);
    taken
}

fn settle(remaining: f64) -> LedgerResult<()> {
    if is_settled(remaining) {
        Ok(())
    } else {
        Err(LedgerError::InsufficientFunds {
            remaining: round6(remaining),
        })
    }
}

/// Standard purchase deduction: wallet -> earnings -> bounty.
pub fn deduct(amount: f64, current: &Buckets) -> LedgerResult<Deduction> {
    let amount = round2(amount);
    let mut remaining = amount;

    let from_wallet = take(&mut remaining, current.primary_wallet);
    let from_earnings = take(&mut remaining, current.primary_earnings);
    let from_bounty = take(&mut remaining, current.referral_bounty);
    settle(remaining)?;

    Ok(Deduction {
        buckets: apply(current, amount, from_wallet, from_earnings, from_bounty),
        from_wallet,
        from_earnings,
        from_bounty,
        is_from_wallet: from_earnings == 0.0 && from_bounty == 0.0,
        is_reinvestment: from_earnings > 0.0,
    })
}

/// Reinvestment-only deduction: earnings -> bounty, the primary wallet is never touched.
pub fn deduct_reinvestment(amount: f64, current: &Buckets) -> LedgerResult<Deduction> {
    let amount = round2(amount);
    let mut remaining = amount;

    let from_earnings = take(&mut remaining, current.primary_earnings);
    let from_bounty = take(&mut remaining, current.referral_bounty);
    settle(remaining)?;

    Ok(Deduction {
        buckets: apply(current, amount, 0.0, from_earnings, from_bounty),
        from_wallet: 0.0,
        from_earnings,
        from_bounty,
        is_from_wallet: false,
        is_reinvestment: true,
    })
}

fn apply(
    current: &Buckets,
    amount: f64,
    from_wallet: f64,
    from_earnings: f64,
    from_bounty: f64,
) -> Buckets {
    Buckets {
        combined_balance: round2(current.combined_balance - amount),
        primary_wallet: round2(current.primary_wallet - from_wallet),
        primary_earnings: round2(current.primary_earnings - from_earnings),
        referral_bounty: round2(current.referral_bounty - from_bounty),
    }
}
