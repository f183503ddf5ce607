//! Ledger errors.
//!
//! Every failure inside a ledger mutation surfaces as a [`LedgerError`] and
//! aborts the enclosing transaction. [`LedgerError::kind`] folds the variants
//! into the coarse taxonomy callers branch on.

use serde::Serialize;
use thiserror::Error;

use crate::wallet::EarningsType;

/// Coarse error classes exposed to the application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InsufficientFunds,
    DuplicateRequest,
    /// Corrupted referral data; never a user error.
    DataIntegrity,
    Storage,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("package {0} not found")]
    PackageNotFound(i64),
    #[error("package {0} is disabled")]
    PackageDisabled(i64),
    #[error("member {0} not found")]
    MemberNotFound(i64),
    #[error("package connection {0} not found")]
    ConnectionNotFound(i64),
    #[error("withdrawal request {0} not found")]
    WithdrawalNotFound(i64),
    #[error("deposit request {0} not found")]
    DepositNotFound(i64),

    #[error("insufficient balance: available {available:.2}, requested {requested:.2}")]
    InsufficientBalance { available: f64, requested: f64 },
    #[error("insufficient funds: {remaining:.6} left unsettled after draining every bucket")]
    InsufficientFunds { remaining: f64 },
    #[error("merchant {merchant_id} float {available:.2} cannot cover {requested:.2}")]
    InsufficientMerchantFloat {
        merchant_id: i64,
        available: f64,
        requested: f64,
    },

    #[error("request {0} is no longer pending")]
    RequestNotPending(i64),
    #[error("package connection {0} has already ended")]
    PackageAlreadyEnded(i64),
    #[error("package connection {0} has not matured yet")]
    PackageNotMatured(i64),
    #[error("member {member_id} may not decide request {request_id}")]
    NotAuthorized { member_id: i64, request_id: i64 },

    #[error("member {member_id} already has a {earnings_type} withdrawal today")]
    DuplicateWithdrawalToday {
        member_id: i64,
        earnings_type: EarningsType,
    },
    #[error("member {0} already has a pending deposit")]
    DuplicateDepositPending(i64),

    #[error("member {member_id} is missing from its own hierarchy '{hierarchy}'")]
    MemberNotInHierarchy { member_id: i64, hierarchy: String },
    #[error("member {member_id} appears more than once in hierarchy '{hierarchy}'")]
    CyclicHierarchy { member_id: i64, hierarchy: String },
    #[error("hierarchy '{0}' contains a non-numeric segment")]
    MalformedHierarchy(String),
    #[error("hierarchy of member {member_id} names unknown referrer {referrer_id}")]
    UnknownReferrer { member_id: i64, referrer_id: i64 },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("blocking task failed: {0}")]
    Task(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::PackageNotFound(_)
            | LedgerError::MemberNotFound(_)
            | LedgerError::ConnectionNotFound(_)
            | LedgerError::WithdrawalNotFound(_)
            | LedgerError::DepositNotFound(_) => ErrorKind::NotFound,
            LedgerError::PackageDisabled(_)
            | LedgerError::RequestNotPending(_)
            | LedgerError::PackageAlreadyEnded(_)
            | LedgerError::PackageNotMatured(_)
            | LedgerError::NotAuthorized { .. } => ErrorKind::InvalidState,
            LedgerError::InsufficientBalance { .. }
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::InsufficientMerchantFloat { .. } => ErrorKind::InsufficientFunds,
            LedgerError::DuplicateWithdrawalToday { .. }
            | LedgerError::DuplicateDepositPending(_) => ErrorKind::DuplicateRequest,
            LedgerError::MemberNotInHierarchy { .. }
            | LedgerError::CyclicHierarchy { .. }
            | LedgerError::MalformedHierarchy(_)
            | LedgerError::UnknownReferrer { .. } => ErrorKind::DataIntegrity,
            LedgerError::Storage(_) | LedgerError::Task(_) => ErrorKind::Storage,
        }
    }

    pub fn is_data_integrity(&self) -> bool {
        self.kind() == ErrorKind::DataIntegrity
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(LedgerError::PackageNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(LedgerError::RequestNotPending(3).kind(), ErrorKind::InvalidState);
        assert_eq!(
            LedgerError::NotAuthorized {
                member_id: 4,
                request_id: 3
            }
            .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            LedgerError::DuplicateDepositPending(4).kind(),
            ErrorKind::DuplicateRequest
        );
        assert!(LedgerError::MalformedHierarchy("1.x".into()).is_data_integrity());
        assert_eq!(
            LedgerError::InsufficientFunds { remaining: 1.0 }.kind(),
            ErrorKind::InsufficientFunds
        );
    }
}
