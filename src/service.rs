//! Async facade over the ledger engine.
//!
//! Each call opens its own connection on the blocking pool and runs one
//! engine operation there. Concurrent calls therefore behave like separate
//! request workers: they serialize on the database write lock, never on an
//! in-process mutex.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::deposit::DepositReceipt;
use crate::engine::LedgerEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::purchase::{ClaimReceipt, PurchaseReceipt};
use crate::reconcile::ReconcileReport;
use crate::store::requests::DepositRequest;
use crate::wallet::{Buckets, EarningsType};
use crate::withdrawal::WithdrawalReceipt;

#[derive(Clone)]
pub struct LedgerService {
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
}

impl LedgerService {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            clock,
        }
    }

    /// Run `op` against a fresh engine on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut LedgerEngine) -> LedgerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let config = EngineConfig::clone(&self.config);
        let clock = Arc::clone(&self.clock);
        tokio::task::spawn_blocking(move || {
            let mut engine = LedgerEngine::open_with_clock(config, clock)?;
            op(&mut engine)
        })
        .await
        .map_err(|e| LedgerError::Task(e.to_string()))?
    }

    pub async fn purchase(&self, member_id: i64, package_id: i64, amount: f64) -> LedgerResult<PurchaseReceipt> {
        self.run(move |engine| engine.purchase(member_id, package_id, amount))
            .await
    }

    pub async fn reinvest(&self, member_id: i64, package_id: i64, amount: f64) -> LedgerResult<PurchaseReceipt> {
        self.run(move |engine| engine.reinvest(member_id, package_id, amount))
            .await
    }

    pub async fn claim_package(&self, member_id: i64, connection_id: i64) -> LedgerResult<ClaimReceipt> {
        self.run(move |engine| engine.claim_package(member_id, connection_id))
            .await
    }

    pub async fn request_withdrawal(
        &self,
        member_id: i64,
        earnings_type: EarningsType,
        amount: f64,
        payout_details: String,
    ) -> LedgerResult<WithdrawalReceipt> {
        self.run(move |engine| {
            engine.request_withdrawal(member_id, earnings_type, amount, &payout_details)
        })
        .await
    }

    pub async fn approve_withdrawal(&self, request_id: i64, decided_by: i64) -> LedgerResult<WithdrawalReceipt> {
        self.run(move |engine| engine.approve_withdrawal(request_id, decided_by))
            .await
    }

    pub async fn reject_withdrawal(
        &self,
        request_id: i64,
        decided_by: i64,
        reason: String,
    ) -> LedgerResult<WithdrawalReceipt> {
        self.run(move |engine| engine.reject_withdrawal(request_id, decided_by, &reason))
            .await
    }

    pub async fn request_deposit(
        &self,
        member_id: i64,
        amount: f64,
        merchant_id: Option<i64>,
    ) -> LedgerResult<DepositRequest> {
        self.run(move |engine| engine.request_deposit(member_id, amount, merchant_id))
            .await
    }

    pub async fn approve_deposit(&self, request_id: i64, approver_id: i64) -> LedgerResult<DepositReceipt> {
        self.run(move |engine| engine.approve_deposit(request_id, approver_id))
            .await
    }

    pub async fn reject_deposit(
        &self,
        request_id: i64,
        approver_id: i64,
        reason: String,
    ) -> LedgerResult<DepositReceipt> {
        self.run(move |engine| engine.reject_deposit(request_id, approver_id, &reason))
            .await
    }

    pub async fn balances(&self, member_id: i64) -> LedgerResult<Buckets> {
        self.run(move |engine| engine.balances(member_id)).await
    }

    pub async fn reconcile(&self, member_id: i64) -> LedgerResult<ReconcileReport> {
        self.run(move |engine| engine.reconcile(member_id)).await
    }
}
