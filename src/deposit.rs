//! Deposit Approval Orchestrator
//!
//! Top-ups land in the primary wallet once staff approve them. When the
//! approver is a merchant the cash came through their till, so their float
//! is drawn down by the same amount.

use tracing::info;
use uuid::Uuid;

use crate::engine::LedgerEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::money::round2;
use crate::notify::{self, NotificationKind};
use crate::store::funds;
use crate::store::ledger::{append_tx_log, fetch_ledger, lock_or_create_ledger, save_ledger};
use crate::store::referral::{self, Role};
use crate::store::requests::{self, DepositRequest, RequestStatus};
use crate::wallet::Buckets;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DepositReceipt {
    pub request: DepositRequest,
    pub balances: Buckets,
    /// Merchant float after the decision, when a merchant approved
    pub merchant_float: Option<f64>,
}

impl LedgerEngine {
    /// Open a PENDING top-up. A member may only have one open at a time.
    pub fn request_deposit(
        &mut self,
        member_id: i64,
        amount: f64,
        merchant_id: Option<i64>,
    ) -> LedgerResult<DepositRequest> {
        let now = self.clock.now();
        let amount = round2(amount);
        let reference = Uuid::new_v4().to_string();

        let request = self.db.with_tx("request_deposit", |tx| {
            referral::require_member(tx, member_id)?;
            if let Some(merchant) = merchant_id {
                referral::require_member(tx, merchant)?;
            }
            if requests::has_pending_deposit(tx, member_id)? {
                return Err(LedgerError::DuplicateDepositPending(member_id));
            }
            let id = requests::insert_deposit(tx, &reference, member_id, amount, merchant_id, now)?;
            requests::fetch_deposit(tx, id)?.ok_or(LedgerError::DepositNotFound(id))
        })?;

        info!(
            "[DEPOSIT] #{} member #{} requested top-up of {:.2}",
            request.id, request.member_id, request.amount
        );
        Ok(request)
    }

    pub fn approve_deposit(&mut self, request_id: i64, approver_id: i64) -> LedgerResult<DepositReceipt> {
        let now = self.clock.now();

        let receipt = self.db.with_tx("approve_deposit", |tx| {
            let pending = pending_deposit(tx, request_id)?;
            let approver = referral::require_decider(tx, approver_id, pending.member_id, request_id)?;

            let merchant_float = if approver.role == Role::Merchant {
                let available = funds::fetch_merchant_float(tx, approver_id)?;
                if round2(available) < pending.amount {
                    return Err(LedgerError::InsufficientMerchantFloat {
                        merchant_id: approver_id,
                        available,
                        requested: pending.amount,
                    });
                }
                Some(funds::adjust_merchant_float(tx, approver_id, -pending.amount, now)?)
            } else {
                None
            };

            if !requests::decide_deposit(tx, request_id, RequestStatus::Approved, approver_id, None, now)? {
                return Err(LedgerError::RequestNotPending(request_id));
            }

            let member_id = pending.member_id;
            let mut buckets = lock_or_create_ledger(tx, member_id, now)?;
            buckets.credit_wallet(pending.amount);
            save_ledger(tx, member_id, &buckets, now)?;
            append_tx_log(
                tx,
                member_id,
                pending.amount,
                &format!("Top-up #{request_id} approved"),
                now,
            )?;
            notify::push(
                tx,
                member_id,
                NotificationKind::DepositApproved,
                &format!("Your top-up of {:.2} was credited to your wallet", pending.amount),
                now,
            )?;

            let request = requests::fetch_deposit(tx, request_id)?
                .ok_or(LedgerError::DepositNotFound(request_id))?;
            Ok(DepositReceipt {
                request,
                balances: buckets,
                merchant_float,
            })
        })?;

        info!(
            "[DEPOSIT] #{} approved by member #{}: +{:.2} to member #{}",
            receipt.request.id, approver_id, receipt.request.amount, receipt.request.member_id
        );
        Ok(receipt)
    }

    /// Reject a top-up. Balances are untouched; the log records the attempt.
    pub fn reject_deposit(
        &mut self,
        request_id: i64,
        approver_id: i64,
        reason: &str,
    ) -> LedgerResult<DepositReceipt> {
        let now = self.clock.now();

        let receipt = self.db.with_tx("reject_deposit", |tx| {
            let pending = pending_deposit(tx, request_id)?;
            referral::require_decider(tx, approver_id, pending.member_id, request_id)?;

            if !requests::decide_deposit(
                tx,
                request_id,
                RequestStatus::Rejected,
                approver_id,
                Some(reason),
                now,
            )? {
                return Err(LedgerError::RequestNotPending(request_id));
            }

            let member_id = pending.member_id;
            append_tx_log(
                tx,
                member_id,
                0.0,
                &format!(
                    "Top-up #{request_id} of {:.2} rejected: {reason}",
                    pending.amount
                ),
                now,
            )?;
            notify::push(
                tx,
                member_id,
                NotificationKind::DepositRejected,
                &format!("Your top-up of {:.2} was rejected: {reason}", pending.amount),
                now,
            )?;

            let request = requests::fetch_deposit(tx, request_id)?
                .ok_or(LedgerError::DepositNotFound(request_id))?;
            Ok(DepositReceipt {
                request,
                balances: fetch_ledger(tx, member_id)?.unwrap_or_default(),
                merchant_float: None,
            })
        })?;

        info!(
            "[DEPOSIT] #{} rejected by member #{}: {}",
            receipt.request.id, approver_id, reason
        );
        Ok(receipt)
    }
}

fn pending_deposit(conn: &rusqlite::Connection, request_id: i64) -> LedgerResult<DepositRequest> {
    let request = requests::fetch_deposit(conn, request_id)?
        .ok_or(LedgerError::DepositNotFound(request_id))?;
    if request.status != RequestStatus::Pending {
        return Err(LedgerError::RequestNotPending(request_id));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;
    use crate::store::ledger::TxLogFilter;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn engine() -> LedgerEngine {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 2, 8, 30, 0).unwrap(),
        ));
        LedgerEngine::in_memory(EngineConfig::default(), clock).unwrap()
    }

    #[test]
    fn test_admin_approval_credits_wallet() {
        let mut engine = engine();
        let admin = engine.register_member("admin", Role::Admin, None).unwrap();
        let member = engine.register_member("m", Role::Member, None).unwrap();

        let request = engine.request_deposit(member.id, 250.0, None).unwrap();
        let receipt = engine.approve_deposit(request.id, admin.id).unwrap();

        assert_eq!(receipt.balances, Buckets::new(250.0, 0.0, 0.0));
        assert_eq!(receipt.request.status, RequestStatus::Approved);
        assert_eq!(receipt.merchant_float, None);
    }

    #[test]
    fn test_merchant_float_is_drawn_down() {
        let mut engine = engine();
        let shop = engine.register_member("shop", Role::Merchant, None).unwrap();
        let member = engine.register_member("m", Role::Member, None).unwrap();
        engine.top_up_merchant_float(shop.id, 100.0).unwrap();

        let big = engine.request_deposit(member.id, 150.0, Some(shop.id)).unwrap();
        let err = engine.approve_deposit(big.id, shop.id).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientMerchantFloat { .. }));
        assert_eq!(engine.merchant_float(shop.id).unwrap(), 100.0);
        assert_eq!(engine.deposit(big.id).unwrap().status, RequestStatus::Pending);

        engine.reject_deposit(big.id, shop.id, "float too low").unwrap();
        let small = engine.request_deposit(member.id, 60.0, Some(shop.id)).unwrap();
        let receipt = engine.approve_deposit(small.id, shop.id).unwrap();
        assert_eq!(receipt.merchant_float, Some(40.0));
        assert_eq!(receipt.balances.primary_wallet, 60.0);
    }

    #[test]
    fn test_one_pending_deposit() {
        let mut engine = engine();
        let member = engine.register_member("m", Role::Member, None).unwrap();
        engine.request_deposit(member.id, 10.0, None).unwrap();
        let err = engine.request_deposit(member.id, 20.0, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateRequest);
    }

    #[test]
    fn test_rejection_logs_without_moving_money() {
        let mut engine = engine();
        let admin = engine.register_member("admin", Role::Admin, None).unwrap();
        let member = engine.register_member("m", Role::Member, None).unwrap();
        let request = engine.request_deposit(member.id, 75.0, None).unwrap();

        let receipt = engine.reject_deposit(request.id, admin.id, "no receipt").unwrap();
        assert_eq!(receipt.balances, Buckets::default());
        assert_eq!(receipt.request.reason.as_deref(), Some("no receipt"));

        let log = engine.transactions(&TxLogFilter::for_member(member.id)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].amount, 0.0);
        assert!(log[0].description.contains("no receipt"));

        let err = engine.approve_deposit(request.id, admin.id).unwrap_err();
        assert!(matches!(err, LedgerError::RequestNotPending(_)));
    }
}
