//! Referral Commissions - bonus tiers and upline chain resolution
//! Chains are resolved from the stored ancestry path, nearest ancestor first

pub mod bonus;
pub mod chain;

pub use bonus::bonus_percentage;
pub use chain::{parse_hierarchy, resolve_chain, ReferralLevel};
