//! Referral ledger engine.
//!
//! Member balances, package purchases with multi-level referral commissions,
//! withdrawals and top-ups, all committed through SQLite immediate
//! transactions so concurrent workers and processes never double-spend.

pub mod clock;
pub mod config;
pub mod deposit;
pub mod engine;
pub mod error;
pub mod ledger_constants;
pub mod money;
pub mod notify;
pub mod purchase;
pub mod reconcile;
pub mod referral;
pub mod service;
pub mod store;
pub mod wallet;
pub mod withdrawal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::LedgerEngine;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use service::LedgerService;
pub use store::referral::Role;
pub use wallet::{Buckets, EarningsType};
