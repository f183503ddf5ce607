//! Package Purchase Orchestrator
//!
//! A purchase debits the buyer, opens a package connection that pays
//! `amount * package.percentage / 100` at maturity, and credits every upline
//! referrer (up to the configured depth) with their tier commission. The whole
//! thing is one immediate transaction: any failure leaves no trace.
//!
//! Claims close a matured connection and pay principal plus earnings back
//! into the member's primary earnings bucket.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::LedgerEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::money::{percent_of, round2};
use crate::notify::{self, NotificationKind};
use crate::referral::chain::CommissionType;
use crate::referral::{resolve_chain, ReferralLevel};
use crate::store::funds;
use crate::store::ledger::{append_tx_log, fetch_ledger, lock_or_create_ledger, save_ledger};
use crate::store::packages::{self, CommissionEntry, ConnectionStatus, NewConnection};
use crate::store::referral;
use crate::wallet::{deduct, deduct_reinvestment, Buckets, EarningsType};
use rusqlite::Connection;

/// Which buckets a purchase may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FundingSource {
    /// wallet -> earnings -> bounty
    Standard,
    /// earnings -> bounty only
    Reinvestment,
}

/// One referrer credit made by a purchase.
#[derive(Debug, Clone, Serialize)]
pub struct CommissionCredit {
    pub referrer_id: i64,
    pub level: usize,
    pub percentage: f64,
    pub amount: f64,
    pub commission_type: CommissionType,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub connection_id: i64,
    pub member_id: i64,
    pub package_id: i64,
    pub amount: f64,
    /// Maturity payout owed to the buyer
    pub package_earnings: f64,
    pub completion_deadline: DateTime<Utc>,
    pub balances: Buckets,
    pub is_from_wallet: bool,
    pub is_reinvestment: bool,
    pub commissions: Vec<CommissionCredit>,
    pub company_reserve: f64,
    /// The purchase flipped the buyer's active-member flag
    pub activated_member: bool,
}

impl PurchaseReceipt {
    pub fn total_commissions(&self) -> f64 {
        round2(self.commissions.iter().map(|c| c.amount).sum())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimReceipt {
    pub connection_id: i64,
    pub member_id: i64,
    pub payout: f64,
    pub balances: Buckets,
    pub claimed_at: DateTime<Utc>,
}

impl LedgerEngine {
    /// Buy `package_id` for `amount`, drawing wallet, then earnings, then bounty.
    pub fn purchase(&mut self, member_id: i64, package_id: i64, amount: f64) -> LedgerResult<PurchaseReceipt> {
        self.run_purchase(member_id, package_id, amount, FundingSource::Standard)
    }

    /// Buy `package_id` out of earnings and bounty only; the primary wallet is left alone.
    pub fn reinvest(&mut self, member_id: i64, package_id: i64, amount: f64) -> LedgerResult<PurchaseReceipt> {
        self.run_purchase(member_id, package_id, amount, FundingSource::Reinvestment)
    }

    fn run_purchase(
        &mut self,
        member_id: i64,
        package_id: i64,
        amount: f64,
        source: FundingSource,
    ) -> LedgerResult<PurchaseReceipt> {
        let now = self.clock.now();
        let amount = round2(amount);
        let max_depth = self.config.commission_max_depth;
        let batch_size = self.config.commission_batch_size.max(1);
        let label = match source {
            FundingSource::Standard => "purchase",
            FundingSource::Reinvestment => "reinvest",
        };

        let receipt = self.db.with_tx(label, |tx| {
            let package = packages::fetch_package(tx, package_id)?
                .ok_or(LedgerError::PackageNotFound(package_id))?;
            let member = referral::require_member(tx, member_id)?;
            let current = fetch_ledger(tx, member_id)?.unwrap_or_default();
            let hierarchy = referral::load_hierarchy(tx, member_id)?;

            if !package.is_enabled {
                return Err(LedgerError::PackageDisabled(package_id));
            }
            let available = match source {
                FundingSource::Standard => round2(current.combined_balance),
                FundingSource::Reinvestment => round2(current.reinvestable()),
            };
            if available < amount {
                return Err(LedgerError::InsufficientBalance {
                    available,
                    requested: amount,
                });
            }

            let deduction = match source {
                FundingSource::Standard => deduct(amount, &current)?,
                FundingSource::Reinvestment => deduct_reinvestment(amount, &current)?,
            };
            let package_earnings = percent_of(amount, package.percentage);
            let chain = resolve_chain(hierarchy.as_deref(), member_id, max_depth)?;
            let completion_deadline = now + Duration::days(package.days);

            let connection_id = packages::insert_connection(
                tx,
                &NewConnection {
                    member_id,
                    package_id,
                    amount,
                    earnings: package_earnings,
                    created_at: now,
                    completion_deadline,
                    is_reinvestment: deduction.is_reinvestment,
                },
            )?;
            append_tx_log(
                tx,
                member_id,
                -amount,
                &format!("Purchased package '{}' (connection #{connection_id})", package.name),
                now,
            )?;
            save_ledger(tx, member_id, &deduction.buckets, now)?;
            notify::push(
                tx,
                member_id,
                NotificationKind::PackagePurchased,
                &format!(
                    "You purchased '{}' for {amount:.2}; {package_earnings:.2} pays out on {}",
                    package.name,
                    completion_deadline.format("%Y-%m-%d")
                ),
                now,
            )?;

            let commissions =
                credit_commissions(tx, member_id, connection_id, amount, &chain, batch_size, now)?;
            let paid: f64 = commissions.iter().map(|c| c.amount).sum();
            let company = funds::adjust_company_funds(tx, -package_earnings, amount, paid, now)?;

            let activated_member = !member.is_active_member
                && packages::count_active_connections(tx, member_id)? == 1;
            if activated_member {
                referral::set_active_member(tx, member_id, true)?;
            }

            Ok(PurchaseReceipt {
                connection_id,
                member_id,
                package_id,
                amount,
                package_earnings,
                completion_deadline,
                balances: deduction.buckets,
                is_from_wallet: deduction.is_from_wallet,
                is_reinvestment: deduction.is_reinvestment,
                commissions,
                company_reserve: company.reserve,
                activated_member,
            })
        })?;

        info!(
            "[PURCHASE] member #{} bought package #{} for {:.2} (connection #{}, {} referrers paid {:.2}, reinvestment={})",
            receipt.member_id,
            receipt.package_id,
            receipt.amount,
            receipt.connection_id,
            receipt.commissions.len(),
            receipt.total_commissions(),
            receipt.is_reinvestment
        );
        Ok(receipt)
    }

    /// Close a matured connection and pay principal plus earnings.
    pub fn claim_package(&mut self, member_id: i64, connection_id: i64) -> LedgerResult<ClaimReceipt> {
        let now = self.clock.now();
        let receipt = self.db.with_tx("claim_package", |tx| {
            let connection = packages::fetch_connection(tx, connection_id)?
                .filter(|c| c.member_id == member_id)
                .ok_or(LedgerError::ConnectionNotFound(connection_id))?;

            if connection.status == ConnectionStatus::Ended {
                return Err(LedgerError::PackageAlreadyEnded(connection_id));
            }
            if !connection.is_matured(now) {
                return Err(LedgerError::PackageNotMatured(connection_id));
            }
            if !packages::end_connection(tx, connection_id, now)? {
                return Err(LedgerError::PackageAlreadyEnded(connection_id));
            }

            let payout = connection.payout();
            let mut buckets = lock_or_create_ledger(tx, member_id, now)?;
            buckets.credit(EarningsType::Package, payout);
            save_ledger(tx, member_id, &buckets, now)?;
            append_tx_log(
                tx,
                member_id,
                payout,
                &format!("Claimed package connection #{connection_id}"),
                now,
            )?;
            notify::push(
                tx,
                member_id,
                NotificationKind::PackageClaimed,
                &format!("Package #{connection_id} matured: {payout:.2} added to your earnings"),
                now,
            )?;

            Ok(ClaimReceipt {
                connection_id,
                member_id,
                payout,
                balances: buckets,
                claimed_at: now,
            })
        })?;

        info!(
            "[PURCHASE] member #{} claimed connection #{} for {:.2}",
            receipt.member_id, receipt.connection_id, receipt.payout
        );
        Ok(receipt)
    }

    /// Flag every ACTIVE connection past its deadline as ready to claim.
    pub fn refresh_ready_to_claim(&mut self) -> LedgerResult<usize> {
        let now = self.clock.now();
        let flagged = self
            .db
            .with_tx("refresh_ready_to_claim", |tx| packages::mark_ready_to_claim(tx, now))?;
        if flagged > 0 {
            info!("[PURCHASE] {} connections ready to claim", flagged);
        }
        Ok(flagged)
    }
}

/// Credit each referrer in chain order, `batch_size` at a time.
///
/// Batches only group the writes; they share the caller's transaction.
fn credit_commissions(
    tx: &Connection,
    purchaser_id: i64,
    connection_id: i64,
    amount: f64,
    chain: &[ReferralLevel],
    batch_size: usize,
    now: DateTime<Utc>,
) -> LedgerResult<Vec<CommissionCredit>> {
    let mut credits = Vec::with_capacity(chain.len());

    for (batch_no, batch) in chain.chunks(batch_size).enumerate() {
        for level in batch {
            let commission = percent_of(amount, level.percentage);
            if commission <= 0.0 {
                continue;
            }
            if referral::fetch_member(tx, level.member_id)?.is_none() {
                return Err(LedgerError::UnknownReferrer {
                    member_id: purchaser_id,
                    referrer_id: level.member_id,
                });
            }

            let mut buckets = lock_or_create_ledger(tx, level.member_id, now)?;
            buckets.credit(EarningsType::Referral, commission);
            save_ledger(tx, level.member_id, &buckets, now)?;

            let commission_type = level.commission_type();
            packages::insert_commission(
                tx,
                &CommissionEntry {
                    connection_id,
                    purchaser_id,
                    referrer_id: level.member_id,
                    level: level.level,
                    percentage: level.percentage,
                    earnings: commission,
                    commission_type,
                },
                now,
            )?;
            append_tx_log(
                tx,
                level.member_id,
                commission,
                &format!(
                    "Level {} {} commission from member #{purchaser_id} (connection #{connection_id})",
                    level.level,
                    commission_type.as_str()
                ),
                now,
            )?;
            notify::push(
                tx,
                level.member_id,
                NotificationKind::CommissionEarned,
                &format!("You earned {commission:.2} (level {}) from a downline purchase", level.level),
                now,
            )?;

            credits.push(CommissionCredit {
                referrer_id: level.member_id,
                level: level.level,
                percentage: level.percentage,
                amount: commission,
                commission_type,
            });
        }
        debug!(
            "[PURCHASE] connection #{} commission batch {} done ({} referrers)",
            connection_id,
            batch_no + 1,
            batch.len()
        );
    }

    Ok(credits)
}
