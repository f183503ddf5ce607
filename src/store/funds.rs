//! Shared counters: the company reserve row and per-merchant floats.
//!
//! These are rows, not process globals, so every server instance sees the
//! same values and updates them under the same transaction lock as the member
//! ledgers.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::LedgerResult;
use crate::ledger_constants::COMPANY_FUNDS_ROW;
use crate::money::round2;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CompanyFunds {
    /// Float held against future package maturity payouts
    pub reserve: f64,
    pub total_sales: f64,
    pub total_commissions: f64,
}

pub fn fetch_company_funds(conn: &Connection) -> LedgerResult<CompanyFunds> {
    let funds = conn.query_row(
        "SELECT reserve, total_sales, total_commissions FROM company_funds WHERE id = ?1",
        params![COMPANY_FUNDS_ROW],
        |row| {
            Ok(CompanyFunds {
                reserve: row.get(0)?,
                total_sales: row.get(1)?,
                total_commissions: row.get(2)?,
            })
        },
    )?;
    Ok(funds)
}

/// Apply signed deltas to the company counters.
pub fn adjust_company_funds(
    conn: &Connection,
    reserve_delta: f64,
    sales_delta: f64,
    commissions_delta: f64,
    now: DateTime<Utc>,
) -> LedgerResult<CompanyFunds> {
    let current = fetch_company_funds(conn)?;
    let next = CompanyFunds {
        reserve: round2(current.reserve + reserve_delta),
        total_sales: round2(current.total_sales + sales_delta),
        total_commissions: round2(current.total_commissions + commissions_delta),
    };
    conn.execute(
        "UPDATE company_funds
         SET reserve = ?2, total_sales = ?3, total_commissions = ?4, updated_at = ?5
         WHERE id = ?1",
        params![
            COMPANY_FUNDS_ROW,
            next.reserve,
            next.total_sales,
            next.total_commissions,
            now
        ],
    )?;
    Ok(next)
}

/// A merchant's float; merchants without a row have zero.
pub fn fetch_merchant_float(conn: &Connection, merchant_id: i64) -> LedgerResult<f64> {
    let balance: Option<f64> = conn
        .query_row(
            "SELECT balance FROM merchant_floats WHERE merchant_id = ?1",
            params![merchant_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(balance.unwrap_or(0.0))
}

/// Apply a signed delta to a merchant's float and return the new balance.
pub fn adjust_merchant_float(
    conn: &Connection,
    merchant_id: i64,
    delta: f64,
    now: DateTime<Utc>,
) -> LedgerResult<f64> {
    let next = round2(fetch_merchant_float(conn, merchant_id)? + delta);
    conn.execute(
        "INSERT INTO merchant_floats (merchant_id, balance, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(merchant_id) DO UPDATE SET
             balance = excluded.balance,
             updated_at = excluded.updated_at",
        params![merchant_id, next, now],
    )?;
    Ok(next)
}
