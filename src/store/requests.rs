//! Withdrawal and deposit (top-up) request rows.
//!
//! Both request kinds move PENDING -> APPROVED | REJECTED exactly once. The
//! status guard lives in the UPDATE itself so a second decision never matches.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;
use crate::money::round2;
use crate::wallet::EarningsType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RequestStatus::Pending),
            "APPROVED" => Some(RequestStatus::Approved),
            "REJECTED" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// Calendar-day key (UTC) used for the per-day withdrawal rules.
pub fn day_key(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

// =================== Withdrawals ===================

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub reference: String,
    pub member_id: i64,
    pub earnings_type: EarningsType,
    pub amount: f64,
    pub fee: f64,
    pub net_payout: f64,
    /// Amount the request removed from `combined_balance`
    pub debited: f64,
    pub payout_details: String,
    pub status: RequestStatus,
    pub approver_id: Option<i64>,
    pub decided_by: Option<i64>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn withdrawal_from_row(row: &Row<'_>) -> rusqlite::Result<WithdrawalRequest> {
    Ok(WithdrawalRequest {
        id: row.get(0)?,
        reference: row.get(1)?,
        member_id: row.get(2)?,
        earnings_type: row.get(3)?,
        amount: row.get(4)?,
        fee: row.get(5)?,
        net_payout: row.get(6)?,
        payout_details: row.get(7)?,
        status: row.get(8)?,
        approver_id: row.get(9)?,
        decided_by: row.get(10)?,
        decided_at: row.get(11)?,
        reason: row.get(12)?,
        created_at: row.get(13)?,
        debited: row.get(14)?,
    })
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal<'a> {
    pub reference: &'a str,
    pub member_id: i64,
    pub earnings_type: EarningsType,
    pub amount: f64,
    pub fee: f64,
    pub net_payout: f64,
    pub debited: f64,
    pub payout_details: &'a str,
    pub approver_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub fn insert_withdrawal(conn: &Connection, new: &NewWithdrawal<'_>) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO withdrawal_requests
             (reference, member_id, earnings_type, amount, fee, net_payout, payout_details,
              status, approver_id, request_day, created_at, debited)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            new.reference,
            new.member_id,
            new.earnings_type,
            round2(new.amount),
            round2(new.fee),
            round2(new.net_payout),
            new.payout_details,
            RequestStatus::Pending,
            new.approver_id,
            day_key(new.created_at),
            new.created_at,
            round2(new.debited)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_withdrawal(conn: &Connection, request_id: i64) -> LedgerResult<Option<WithdrawalRequest>> {
    let found = conn
        .query_row(
            "SELECT id, reference, member_id, earnings_type, amount, fee, net_payout, payout_details,
                    status, approver_id, decided_by, decided_at, reason, created_at, debited
             FROM withdrawal_requests WHERE id = ?1",
            params![request_id],
            withdrawal_from_row,
        )
        .optional()?;
    Ok(found)
}

/// PENDING or APPROVED withdrawals of one type a member made on `day`.
pub fn count_open_withdrawals_on_day(
    conn: &Connection,
    member_id: i64,
    earnings_type: EarningsType,
    day: NaiveDate,
) -> LedgerResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM withdrawal_requests
         WHERE member_id = ?1 AND earnings_type = ?2 AND request_day = ?3
           AND status IN (?4, ?5)",
        params![
            member_id,
            earnings_type,
            day,
            RequestStatus::Pending,
            RequestStatus::Approved
        ],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Withdrawals `approver_id` approved on `day`.
pub fn approvals_on_day(conn: &Connection, approver_id: i64, day: NaiveDate) -> LedgerResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM withdrawal_requests
         WHERE decided_by = ?1 AND decision_day = ?2 AND status = ?3",
        params![approver_id, day, RequestStatus::Approved],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// PENDING -> `status`. Returns false if the request was no longer pending.
pub fn decide_withdrawal(
    conn: &Connection,
    request_id: i64,
    status: RequestStatus,
    decided_by: i64,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> LedgerResult<bool> {
    let changed = conn.execute(
        "UPDATE withdrawal_requests
         SET status = ?2, decided_by = ?3, decided_at = ?4, decision_day = ?5, reason = ?6
         WHERE id = ?1 AND status = ?7",
        params![
            request_id,
            status,
            decided_by,
            now,
            day_key(now),
            reason,
            RequestStatus::Pending
        ],
    )?;
    Ok(changed == 1)
}

// =================== Deposits ===================

#[derive(Debug, Clone, Serialize)]
pub struct DepositRequest {
    pub id: i64,
    pub reference: String,
    pub member_id: i64,
    pub amount: f64,
    pub merchant_id: Option<i64>,
    pub status: RequestStatus,
    pub decided_by: Option<i64>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn insert_deposit(
    conn: &Connection,
    reference: &str,
    member_id: i64,
    amount: f64,
    merchant_id: Option<i64>,
    now: DateTime<Utc>,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO deposit_requests (reference, member_id, amount, merchant_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            reference,
            member_id,
            round2(amount),
            merchant_id,
            RequestStatus::Pending,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_deposit(conn: &Connection, request_id: i64) -> LedgerResult<Option<DepositRequest>> {
    let found = conn
        .query_row(
            "SELECT id, reference, member_id, amount, merchant_id, status, decided_by, decided_at,
                    reason, created_at
             FROM deposit_requests WHERE id = ?1",
            params![request_id],
            |row| {
                Ok(DepositRequest {
                    id: row.get(0)?,
                    reference: row.get(1)?,
                    member_id: row.get(2)?,
                    amount: row.get(3)?,
                    merchant_id: row.get(4)?,
                    status: row.get(5)?,
                    decided_by: row.get(6)?,
                    decided_at: row.get(7)?,
                    reason: row.get(8)?,
                    created_at: row.get(9)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

pub fn has_pending_deposit(conn: &Connection, member_id: i64) -> LedgerResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM deposit_requests WHERE member_id = ?1 AND status = ?2",
        params![member_id, RequestStatus::Pending],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// PENDING -> `status`. Returns false if the request was no longer pending.
pub fn decide_deposit(
    conn: &Connection,
    request_id: i64,
    status: RequestStatus,
    decided_by: i64,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> LedgerResult<bool> {
    let changed = conn.execute(
        "UPDATE deposit_requests
         SET status = ?2, decided_by = ?3, decided_at = ?4, reason = ?5
         WHERE id = ?1 AND status = ?6",
        params![request_id, status, decided_by, now, reason, RequestStatus::Pending],
    )?;
    Ok(changed == 1)
}
