//! Ledger Constants
//!
//! Table names, commission tiers and the numeric tolerances shared by every
//! orchestrator. Runtime-tunable values live in `config::EngineConfig`; the
//! defaults there come from here.

// =================== Tables ===================
pub const MEMBERS_TABLE: &str = "members";
pub const REFERRALS_TABLE: &str = "referrals";
pub const LEDGERS_TABLE: &str = "member_ledgers";
pub const TX_LOG_TABLE: &str = "transaction_log";
pub const PACKAGES_TABLE: &str = "packages";
pub const CONNECTIONS_TABLE: &str = "package_connections";
pub const COMMISSIONS_TABLE: &str = "commission_log";
pub const WITHDRAWALS_TABLE: &str = "withdrawal_requests";
pub const DEPOSITS_TABLE: &str = "deposit_requests";
pub const NOTIFICATIONS_TABLE: &str = "notifications";
pub const COMPANY_FUNDS_TABLE: &str = "company_funds";
pub const MERCHANT_FLOATS_TABLE: &str = "merchant_floats";

/// The company funds table holds exactly one row with this id.
pub const COMPANY_FUNDS_ROW: i64 = 1;

// =================== Commission tiers ===================

/// Deepest referral level that still earns a commission.
pub const MAX_COMMISSION_DEPTH: usize = 10;

/// Level 1 (direct upline) percentage.
pub const DIRECT_BONUS_PCT: f64 = 10.0;
/// Levels 2..=4.
pub const UPPER_INDIRECT_BONUS_PCT: f64 = 1.5;
/// Levels 5..=10.
pub const LOWER_INDIRECT_BONUS_PCT: f64 = 1.0;

/// Referrers credited per write batch inside a purchase transaction.
pub const DEFAULT_COMMISSION_BATCH_SIZE: usize = 100;

// =================== Withdrawals ===================

/// Flat fee applied to PACKAGE and REFERRAL withdrawals.
pub const DEFAULT_WITHDRAWAL_FEE_PCT: f64 = 10.0;

// =================== Numerics ===================

/// Residual (after micro-rounding) below which a deduction counts as settled.
pub const SETTLEMENT_EPSILON: f64 = 1e-6;

/// Tolerance used when reconciling stored balances against the transaction log.
pub const RECONCILE_TOLERANCE: f64 = 0.005;

// =================== Storage ===================
pub const DEFAULT_DB_PATH: &str = "ledger.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Check whether an environment flag is set to a truthy value ("1", "true", "yes").
pub fn is_env_flag_set(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
