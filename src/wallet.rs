//! Member wallet buckets.
//!
//! A member's spendable funds live in three buckets plus a cached combined
//! total. `EarningsType` selects the bucket a withdrawal draws from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::round2;

pub mod deduction;

pub use deduction::{deduct, deduct_reinvestment, Deduction};

/// Bucket values of one member ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Buckets {
    pub combined_balance: f64,
    pub primary_wallet: f64,
    pub primary_earnings: f64,
    pub referral_bounty: f64,
}

impl Buckets {
    pub fn new(primary_wallet: f64, primary_earnings: f64, referral_bounty: f64) -> Self {
        Self {
            combined_balance: round2(primary_wallet + primary_earnings + referral_bounty),
            primary_wallet,
            primary_earnings,
            referral_bounty,
        }
    }

    pub fn bucket_sum(&self) -> f64 {
        round2(self.primary_wallet + self.primary_earnings + self.referral_bounty)
    }

    /// Funds available to the reinvestment-only deduction variant.
    pub fn reinvestable(&self) -> f64 {
        round2(self.primary_earnings + self.referral_bounty)
    }

    pub fn earnings(&self, earnings_type: EarningsType) -> f64 {
        match earnings_type {
            EarningsType::Package => self.primary_earnings,
            EarningsType::Referral => self.referral_bounty,
        }
    }

    fn earnings_mut(&mut self, earnings_type: EarningsType) -> &mut f64 {
        match earnings_type {
            EarningsType::Package => &mut self.primary_earnings,
            EarningsType::Referral => &mut self.referral_bounty,
        }
    }

    /// Add to an earnings bucket and the combined total.
    pub fn credit(&mut self, earnings_type: EarningsType, amount: f64) {
        let bucket = self.earnings_mut(earnings_type);
        *bucket = round2(*bucket + amount);
        self.combined_balance = round2(self.combined_balance + amount);
    }

    /// Take from an earnings bucket and the combined total, clamping both at zero.
    /// Returns what actually left the combined total.
    pub fn debit(&mut self, earnings_type: EarningsType, amount: f64) -> f64 {
        let bucket = self.earnings_mut(earnings_type);
        *bucket = round2(*bucket - amount).max(0.0);
        let before = self.combined_balance;
        self.combined_balance = round2(before - amount).max(0.0);
        round2(before - self.combined_balance)
    }

    /// Undo a [`Buckets::debit`]: the bucket gets `amount` back, the combined
    /// total only what the debit removed from it.
    pub fn restore(&mut self, earnings_type: EarningsType, amount: f64, debited: f64) {
        let bucket = self.earnings_mut(earnings_type);
        *bucket = round2(*bucket + amount);
        self.combined_balance = round2(self.combined_balance + debited.min(amount));
    }

    pub fn credit_wallet(&mut self, amount: f64) {
        self.primary_wallet = round2(self.primary_wallet + amount);
        self.combined_balance = round2(self.combined_balance + amount);
    }
}

/// Which earnings bucket a withdrawal is paid from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EarningsType {
    /// Package maturity payouts (`primary_earnings`)
    Package,
    /// Referral commissions (`referral_bounty`)
    Referral,
}

impl EarningsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EarningsType::Package => "PACKAGE",
            EarningsType::Referral => "REFERRAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PACKAGE" => Some(EarningsType::Package),
            "REFERRAL" => Some(EarningsType::Referral),
            _ => None,
        }
    }

    /// Withdrawal fee for this bucket; both bucket types currently pay the flat rate.
    pub fn fee_pct(&self, flat_pct: f64) -> f64 {
        match self {
            EarningsType::Package | EarningsType::Referral => flat_pct,
        }
    }
}

impl fmt::Display for EarningsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
