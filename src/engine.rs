//! Ledger Engine
//!
//! Owns one database connection plus config and clock. The orchestrators
//! (`purchase`, `withdrawal`, `deposit`, `reconcile`) extend it with their own
//! `impl LedgerEngine` blocks; this file holds setup, registration and the
//! lock-free read side.
//!
//! An engine is single-connection and takes `&mut self` for writes. Run one
//! engine per worker; cross-worker safety comes from the store's transaction
//! lock, not from sharing an engine.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::round2;
use crate::notify::{self, Notification};
use crate::store::funds::{self, CompanyFunds};
use crate::store::ledger::{self, TxLogEntry, TxLogFilter};
use crate::store::packages::{self, Package, PackageConnection};
use crate::store::referral::{self, Member, Role};
use crate::store::requests::{self, DepositRequest, WithdrawalRequest};
use crate::store::LedgerDb;
use crate::wallet::Buckets;

pub struct LedgerEngine {
    pub(crate) db: LedgerDb,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    /// Open the configured database with the wall clock.
    pub fn open(config: EngineConfig) -> LedgerResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> LedgerResult<Self> {
        let db = LedgerDb::open(&config)?;
        tracing::debug!(
            "[LEDGER] opened {} (busy_timeout={}ms)",
            config.database_path.display(),
            config.busy_timeout_ms
        );
        Ok(Self { db, config, clock })
    }

    /// Engine over a private in-memory database.
    pub fn in_memory(config: EngineConfig, clock: Arc<dyn Clock>) -> LedgerResult<Self> {
        Ok(Self {
            db: LedgerDb::in_memory()?,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // =================== Registration & catalogue ===================

    /// Register a member, optionally under a referrer.
    ///
    /// The new member's hierarchy is the referrer's hierarchy with the new id
    /// appended. A referrer who joined without an upline has no stored path,
    /// so theirs is just their own id.
    pub fn register_member(
        &mut self,
        username: &str,
        role: Role,
        referrer_id: Option<i64>,
    ) -> LedgerResult<Member> {
        let now = self.clock.now();
        let member = self.db.with_tx("register_member", |tx| {
            let parent_path = match referrer_id {
                Some(referrer) => {
                    referral::require_member(tx, referrer)?;
                    Some(
                        referral::load_hierarchy(tx, referrer)?
                            .unwrap_or_else(|| referrer.to_string()),
                    )
                }
                None => None,
            };

            let member_id = referral::insert_member(tx, username, role, now)?;
            if let (Some(referrer), Some(parent_path)) = (referrer_id, parent_path) {
                let hierarchy = format!("{parent_path}.{member_id}");
                referral::insert_referral(tx, member_id, referrer, &hierarchy)?;
            }
            referral::require_member(tx, member_id)
        })?;

        tracing::info!(
            "[LEDGER] registered member #{} '{}' role={} referrer={:?}",
            member.id,
            member.username,
            member.role.as_str(),
            referrer_id
        );
        Ok(member)
    }

    pub fn upsert_package(
        &mut self,
        id: Option<i64>,
        name: &str,
        percentage: f64,
        days: i64,
        is_enabled: bool,
    ) -> LedgerResult<Package> {
        self.db.with_tx("upsert_package", |tx| {
            let package_id = packages::upsert_package(tx, id, name, percentage, days, is_enabled)?;
            packages::fetch_package(tx, package_id)?.ok_or(LedgerError::PackageNotFound(package_id))
        })
    }

    /// Add funds to the company reserve that backs maturity payouts.
    pub fn fund_company_reserve(&mut self, amount: f64) -> LedgerResult<CompanyFunds> {
        let now = self.clock.now();
        let amount = round2(amount);
        let funds = self.db.with_tx("fund_company_reserve", |tx| {
            funds::adjust_company_funds(tx, amount, 0.0, 0.0, now)
        })?;
        tracing::info!(
            "[LEDGER] company reserve +{:.2} -> {:.2}",
            amount,
            funds.reserve
        );
        Ok(funds)
    }

    /// Credit a merchant's float so it can approve top-ups.
    pub fn top_up_merchant_float(&mut self, merchant_id: i64, amount: f64) -> LedgerResult<f64> {
        let now = self.clock.now();
        let amount = round2(amount);
        let balance = self.db.with_tx("top_up_merchant_float", |tx| {
            referral::require_member(tx, merchant_id)?;
            funds::adjust_merchant_float(tx, merchant_id, amount, now)
        })?;
        tracing::info!(
            "[LEDGER] merchant #{} float +{:.2} -> {:.2}",
            merchant_id,
            amount,
            balance
        );
        Ok(balance)
    }

    // =================== Reads (no lock) ===================

    pub fn member(&self, member_id: i64) -> LedgerResult<Member> {
        referral::require_member(self.db.conn(), member_id)
    }

    pub fn hierarchy(&self, member_id: i64) -> LedgerResult<Option<String>> {
        referral::load_hierarchy(self.db.conn(), member_id)
    }

    /// Direct upline; `None` for root members.
    pub fn referrer(&self, member_id: i64) -> LedgerResult<Option<i64>> {
        referral::direct_referrer(self.db.conn(), member_id)
    }

    /// Current buckets; members with no ledger row yet read as zero.
    pub fn balances(&self, member_id: i64) -> LedgerResult<Buckets> {
        Ok(ledger::fetch_ledger(self.db.conn(), member_id)?.unwrap_or_default())
    }

    pub fn company_funds(&self) -> LedgerResult<CompanyFunds> {
        funds::fetch_company_funds(self.db.conn())
    }

    pub fn merchant_float(&self, merchant_id: i64) -> LedgerResult<f64> {
        funds::fetch_merchant_float(self.db.conn(), merchant_id)
    }

    pub fn transactions(&self, filter: &TxLogFilter) -> LedgerResult<Vec<TxLogEntry>> {
        ledger::list_transactions(self.db.conn(), filter)
    }

    pub fn connections(&self, member_id: i64) -> LedgerResult<Vec<PackageConnection>> {
        packages::list_connections(self.db.conn(), member_id)
    }

    pub fn commissions(&self, connection_id: i64) -> LedgerResult<Vec<packages::CommissionEntry>> {
        packages::commissions_for_connection(self.db.conn(), connection_id)
    }

    pub fn withdrawal(&self, request_id: i64) -> LedgerResult<WithdrawalRequest> {
        requests::fetch_withdrawal(self.db.conn(), request_id)?
            .ok_or(LedgerError::WithdrawalNotFound(request_id))
    }

    pub fn deposit(&self, request_id: i64) -> LedgerResult<DepositRequest> {
        requests::fetch_deposit(self.db.conn(), request_id)?
            .ok_or(LedgerError::DepositNotFound(request_id))
    }

    pub fn notifications(&self, member_id: i64, unread_only: bool) -> LedgerResult<Vec<Notification>> {
        notify::list_notifications(self.db.conn(), member_id, unread_only)
    }

    pub fn mark_notifications_read(&mut self, member_id: i64) -> LedgerResult<usize> {
        self.db
            .with_tx("mark_notifications_read", |tx| notify::mark_read(tx, member_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn engine() -> LedgerEngine {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
        ));
        LedgerEngine::in_memory(EngineConfig::default(), clock).unwrap()
    }

    #[test]
    fn test_register_builds_hierarchy() {
        let mut engine = engine();
        let root = engine.register_member("root", Role::Member, None).unwrap();
        let a = engine.register_member("a", Role::Member, Some(root.id)).unwrap();
        let b = engine.register_member("b", Role::Member, Some(a.id)).unwrap();

        assert_eq!(engine.hierarchy(root.id).unwrap(), None);
        assert_eq!(
            engine.hierarchy(a.id).unwrap(),
            Some(format!("{}.{}", root.id, a.id))
        );
        assert_eq!(
            engine.hierarchy(b.id).unwrap(),
            Some(format!("{}.{}.{}", root.id, a.id, b.id))
        );
    }

    #[test]
    fn test_register_under_unknown_referrer() {
        let mut engine = engine();
        let err = engine.register_member("orphan", Role::Member, Some(77)).unwrap_err();
        assert!(matches!(err, LedgerError::MemberNotFound(77)));
    }

    #[test]
    fn test_package_upsert() {
        let mut engine = engine();
        let p = engine.upsert_package(None, "Starter", 10.0, 7, true).unwrap();
        assert_eq!(p.days, 7);
        let p = engine.upsert_package(Some(p.id), "Starter", 12.0, 7, false).unwrap();
        assert_eq!(p.percentage, 12.0);
        assert!(!p.is_enabled);
    }

    #[test]
    fn test_balances_default_to_zero() {
        let mut engine = engine();
        let m = engine.register_member("m", Role::Member, None).unwrap();
        assert_eq!(engine.balances(m.id).unwrap(), Buckets::default());
    }
}
