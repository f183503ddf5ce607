//! Withdrawal Orchestrator
//!
//! Funds leave the ledger at request time: the selected bucket is debited
//! by the full amount while the request waits for staff. Approval is terminal
//! with no further ledger effect; rejection refunds the full amount to the
//! same bucket, and the combined total only what the request took from it. A member may hold one PENDING or APPROVED withdrawal per
//! earnings type per UTC day.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::LedgerEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::money::{percent_of, round2};
use crate::notify::{self, NotificationKind};
use crate::store::ledger::{append_tx_log, fetch_ledger, lock_or_create_ledger, save_ledger};
use crate::store::referral::{self, Role};
use crate::store::requests::{self, day_key, NewWithdrawal, RequestStatus, WithdrawalRequest};
use crate::wallet::{Buckets, EarningsType};

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalReceipt {
    pub request: WithdrawalRequest,
    pub balances: Buckets,
}

/// Staff decision on a pending withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalDecision {
    Approve,
    Reject { reason: String },
}

impl LedgerEngine {
    pub fn request_withdrawal(
        &mut self,
        member_id: i64,
        earnings_type: EarningsType,
        amount: f64,
        payout_details: &str,
    ) -> LedgerResult<WithdrawalReceipt> {
        let now = self.clock.now();
        let day = day_key(now);
        let amount = round2(amount);
        let fee_pct = earnings_type.fee_pct(self.config.withdrawal_fee_pct);
        let reference = Uuid::new_v4().to_string();

        let receipt = self.db.with_tx("request_withdrawal", |tx| {
            referral::require_member(tx, member_id)?;
            if requests::count_open_withdrawals_on_day(tx, member_id, earnings_type, day)? > 0 {
                return Err(LedgerError::DuplicateWithdrawalToday {
                    member_id,
                    earnings_type,
                });
            }

            let mut buckets = fetch_ledger(tx, member_id)?.unwrap_or_default();
            let available = round2(buckets.earnings(earnings_type));
            if available < amount {
                return Err(LedgerError::InsufficientBalance {
                    available,
                    requested: amount,
                });
            }

            let fee = percent_of(amount, fee_pct);
            let net_payout = round2(amount - fee);
            let approver_id = pick_approver(tx, day)?;
            let debited = buckets.debit(earnings_type, amount);

            let request_id = requests::insert_withdrawal(
                tx,
                &NewWithdrawal {
                    reference: &reference,
                    member_id,
                    earnings_type,
                    amount,
                    fee,
                    net_payout,
                    debited,
                    payout_details,
                    approver_id,
                    created_at: now,
                },
            )?;
            save_ledger(tx, member_id, &buckets, now)?;
            append_tx_log(
                tx,
                member_id,
                -amount,
                &format!(
                    "Withdrawal request #{request_id} ({earnings_type}): fee {fee:.2}, net {net_payout:.2}"
                ),
                now,
            )?;
            notify::push(
                tx,
                member_id,
                NotificationKind::WithdrawalRequested,
                &format!("Your {earnings_type} withdrawal of {amount:.2} is awaiting approval"),
                now,
            )?;

            let request = requests::fetch_withdrawal(tx, request_id)?
                .ok_or(LedgerError::WithdrawalNotFound(request_id))?;
            Ok(WithdrawalReceipt {
                request,
                balances: buckets,
            })
        })?;

        info!(
            "[WITHDRAWAL] #{} member #{} {} {:.2} (fee {:.2}) assigned to {:?}",
            receipt.request.id,
            receipt.request.member_id,
            receipt.request.earnings_type,
            receipt.request.amount,
            receipt.request.fee,
            receipt.request.approver_id
        );
        Ok(receipt)
    }

    pub fn approve_withdrawal(&mut self, request_id: i64, decided_by: i64) -> LedgerResult<WithdrawalReceipt> {
        self.decide_withdrawal(request_id, decided_by, WithdrawalDecision::Approve)
    }

    pub fn reject_withdrawal(
        &mut self,
        request_id: i64,
        decided_by: i64,
        reason: &str,
    ) -> LedgerResult<WithdrawalReceipt> {
        self.decide_withdrawal(
            request_id,
            decided_by,
            WithdrawalDecision::Reject {
                reason: reason.to_string(),
            },
        )
    }

    /// PENDING -> APPROVED | REJECTED, exactly once.
    pub fn decide_withdrawal(
        &mut self,
        request_id: i64,
        decided_by: i64,
        decision: WithdrawalDecision,
    ) -> LedgerResult<WithdrawalReceipt> {
        let now = self.clock.now();

        let receipt = self.db.with_tx("decide_withdrawal", |tx| {
            let pending = requests::fetch_withdrawal(tx, request_id)?
                .ok_or(LedgerError::WithdrawalNotFound(request_id))?;
            if pending.status != RequestStatus::Pending {
                return Err(LedgerError::RequestNotPending(request_id));
            }
            referral::require_decider(tx, decided_by, pending.member_id, request_id)?;

            let (status, reason) = match &decision {
                WithdrawalDecision::Approve => (RequestStatus::Approved, None),
                WithdrawalDecision::Reject { reason } => (RequestStatus::Rejected, Some(reason.as_str())),
            };
            if !requests::decide_withdrawal(tx, request_id, status, decided_by, reason, now)? {
                return Err(LedgerError::RequestNotPending(request_id));
            }

            let member_id = pending.member_id;
            let balances = match reason {
                None => {
                    notify::push(
                        tx,
                        member_id,
                        NotificationKind::WithdrawalApproved,
                        &format!(
                            "Your withdrawal of {:.2} was approved; {:.2} is on its way",
                            pending.amount, pending.net_payout
                        ),
                        now,
                    )?;
                    fetch_ledger(tx, member_id)?.unwrap_or_default()
                }
                Some(reason) => {
                    let mut buckets = lock_or_create_ledger(tx, member_id, now)?;
                    buckets.restore(pending.earnings_type, pending.amount, pending.debited);
                    save_ledger(tx, member_id, &buckets, now)?;
                    append_tx_log(
                        tx,
                        member_id,
                        pending.amount,
                        &format!("Refund of rejected withdrawal #{request_id}: {reason}"),
                        now,
                    )?;
                    notify::push(
                        tx,
                        member_id,
                        NotificationKind::WithdrawalRejected,
                        &format!(
                            "Your withdrawal of {:.2} was rejected ({reason}); the amount was refunded",
                            pending.amount
                        ),
                        now,
                    )?;
                    buckets
                }
            };

            let request = requests::fetch_withdrawal(tx, request_id)?
                .ok_or(LedgerError::WithdrawalNotFound(request_id))?;
            Ok(WithdrawalReceipt { request, balances })
        })?;

        info!(
            "[WITHDRAWAL] #{} {} by member #{}",
            receipt.request.id,
            receipt.request.status.as_str(),
            decided_by
        );
        Ok(receipt)
    }
}

/// Approver with the fewest approvals on `day`; lowest id wins ties.
fn pick_approver(conn: &Connection, day: NaiveDate) -> LedgerResult<Option<i64>> {
    let mut best: Option<(i64, i64)> = None;
    for approver in referral::members_with_role(conn, Role::Approver)? {
        let approved = requests::approvals_on_day(conn, approver, day)?;
        if best.map_or(true, |(_, fewest)| approved < fewest) {
            best = Some((approver, approved));
        }
    }
    if best.is_none() {
        warn!("[WITHDRAWAL] no approver staff registered; request left unassigned");
    }
    Ok(best.map(|(approver, _)| approver))
}
