//! Balance reconciliation.
//!
//! Every ledger mutation writes a signed transaction log row for the exact
//! amount it moved, so a member's log sum must equal their combined balance,
//! which in turn must equal the sum of the three buckets.

use serde::Serialize;
use tracing::{error, info};

use crate::engine::LedgerEngine;
use crate::error::LedgerResult;
use crate::ledger_constants::RECONCILE_TOLERANCE;
use crate::store::ledger::{fetch_ledger, ledger_member_ids, sum_tx_log};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub member_id: i64,
    pub combined: f64,
    pub bucket_sum: f64,
    pub log_sum: f64,
    pub consistent: bool,
}

impl ReconcileReport {
    fn new(member_id: i64, combined: f64, bucket_sum: f64, log_sum: f64) -> Self {
        let consistent = (combined - bucket_sum).abs() <= RECONCILE_TOLERANCE
            && (combined - log_sum).abs() <= RECONCILE_TOLERANCE;
        Self {
            member_id,
            combined,
            bucket_sum,
            log_sum,
            consistent,
        }
    }
}

impl LedgerEngine {
    /// Compare one member's stored balances with their transaction log.
    pub fn reconcile(&self, member_id: i64) -> LedgerResult<ReconcileReport> {
        let conn = self.db.conn();
        let buckets = fetch_ledger(conn, member_id)?.unwrap_or_default();
        let report = ReconcileReport::new(
            member_id,
            buckets.combined_balance,
            buckets.bucket_sum(),
            sum_tx_log(conn, member_id)?,
        );
        if !report.consistent {
            error!(
                "[RECONCILE] member #{} out of balance: combined={:.2} buckets={:.2} log={:.2}",
                member_id, report.combined, report.bucket_sum, report.log_sum
            );
        }
        Ok(report)
    }

    /// Reconcile every member with a ledger row; returns only the mismatches.
    pub fn reconcile_all(&self) -> LedgerResult<Vec<ReconcileReport>> {
        let ids = ledger_member_ids(self.db.conn())?;
        let mut mismatches = Vec::new();
        for member_id in &ids {
            let report = self.reconcile(*member_id)?;
            if !report.consistent {
                mismatches.push(report);
            }
        }
        info!(
            "[RECONCILE] checked {} ledgers, {} out of balance",
            ids.len(),
            mismatches.len()
        );
        Ok(mismatches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::store::ledger::save_ledger;
    use crate::store::referral::Role;
    use crate::wallet::Buckets;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn engine() -> LedgerEngine {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap(),
        ));
        LedgerEngine::in_memory(EngineConfig::default(), clock).unwrap()
    }

    #[test]
    fn test_tolerance() {
        assert!(ReconcileReport::new(1, 10.0, 10.0, 10.004).consistent);
        assert!(!ReconcileReport::new(1, 10.0, 10.0, 10.01).consistent);
        assert!(!ReconcileReport::new(1, 10.0, 9.0, 10.0).consistent);
    }

    #[test]
    fn test_deposit_then_purchase_reconciles() {
        let mut engine = engine();
        let admin = engine.register_member("admin", Role::Admin, None).unwrap();
        let member = engine.register_member("m", Role::Member, None).unwrap();
        let package = engine.upsert_package(None, "Gold", 10.0, 30, true).unwrap();

        let request = engine.request_deposit(member.id, 500.0, None).unwrap();
        engine.approve_deposit(request.id, admin.id).unwrap();
        engine.purchase(member.id, package.id, 120.0).unwrap();

        let report = engine.reconcile(member.id).unwrap();
        assert!(report.consistent);
        assert_eq!(report.log_sum, 380.0);
        assert!(engine.reconcile_all().unwrap().is_empty());
    }

    #[test]
    fn test_untracked_credit_is_flagged() {
        let mut engine = engine();
        let m = engine.register_member("m", Role::Member, None).unwrap();
        save_ledger(engine.db.conn(), m.id, &Buckets::new(50.0, 0.0, 0.0), engine.now()).unwrap();

        let mismatches = engine.reconcile_all().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].member_id, m.id);
        assert_eq!(mismatches[0].log_sum, 0.0);
    }
}
