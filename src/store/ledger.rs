//! Member ledger rows and the append-only transaction log.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::Serialize;

use crate::error::LedgerResult;
use crate::money::round2;
use crate::wallet::Buckets;

fn buckets_from_row(row: &Row<'_>) -> rusqlite::Result<Buckets> {
    Ok(Buckets {
        combined_balance: row.get(0)?,
        primary_wallet: row.get(1)?,
        primary_earnings: row.get(2)?,
        referral_bounty: row.get(3)?,
    })
}

/// Read a member's buckets. Inside a `with_tx` transaction this is the locked
/// read the orchestrators rely on; on a bare connection it is a display read.
pub fn fetch_ledger(conn: &Connection, member_id: i64) -> LedgerResult<Option<Buckets>> {
    let buckets = conn
        .query_row(
            "SELECT combined_balance, primary_wallet, primary_earnings, referral_bounty
             FROM member_ledgers WHERE member_id = ?1",
            params![member_id],
            buckets_from_row,
        )
        .optional()?;
    Ok(buckets)
}

/// Read a member's buckets, creating a zeroed row on first touch.
pub fn lock_or_create_ledger(
    conn: &Connection,
    member_id: i64,
    now: DateTime<Utc>,
) -> LedgerResult<Buckets> {
    conn.execute(
        "INSERT OR IGNORE INTO member_ledgers (member_id, updated_at) VALUES (?1, ?2)",
        params![member_id, now],
    )?;
    Ok(fetch_ledger(conn, member_id)?.unwrap_or_default())
}

/// Persist all four bucket values.
pub fn save_ledger(
    conn: &Connection,
    member_id: i64,
    buckets: &Buckets,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO member_ledgers
             (member_id, combined_balance, primary_wallet, primary_earnings, referral_bounty, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(member_id) DO UPDATE SET
             combined_balance = excluded.combined_balance,
             primary_wallet   = excluded.primary_wallet,
             primary_earnings = excluded.primary_earnings,
             referral_bounty  = excluded.referral_bounty,
             updated_at       = excluded.updated_at",
        params![
            member_id,
            round2(buckets.combined_balance),
            round2(buckets.primary_wallet),
            round2(buckets.primary_earnings),
            round2(buckets.referral_bounty),
            now
        ],
    )?;
    Ok(())
}

/// A single transaction log row.
#[derive(Debug, Clone, Serialize)]
pub struct TxLogEntry {
    pub id: i64,
    pub member_id: i64,
    pub amount: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Append to the transaction log. Rows are never updated or deleted.
pub fn append_tx_log(
    conn: &Connection,
    member_id: i64,
    amount: f64,
    description: &str,
    now: DateTime<Utc>,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO transaction_log (member_id, amount, description, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![member_id, round2(amount), description, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Typed filter for transaction log queries. Every condition becomes a bound
/// parameter; nothing user-supplied is spliced into SQL text.
#[derive(Debug, Clone, Default)]
pub struct TxLogFilter {
    pub member_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TxLogFilter {
    pub fn for_member(member_id: i64) -> Self {
        Self {
            member_id: Some(member_id),
            ..Default::default()
        }
    }
}

/// Newest first.
pub fn list_transactions(conn: &Connection, filter: &TxLogFilter) -> LedgerResult<Vec<TxLogEntry>> {
    let mut sql = String::from(
        "SELECT id, member_id, amount, description, created_at FROM transaction_log WHERE 1 = 1",
    );
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(member_id) = filter.member_id {
        args.push(Box::new(member_id));
        sql.push_str(&format!(" AND member_id = ?{}", args.len()));
    }
    if let Some(since) = filter.since {
        args.push(Box::new(since));
        sql.push_str(&format!(" AND created_at >= ?{}", args.len()));
    }
    if let Some(until) = filter.until {
        args.push(Box::new(until));
        sql.push_str(&format!(" AND created_at < ?{}", args.len()));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = filter.limit {
        args.push(Box::new(limit as i64));
        sql.push_str(&format!(" LIMIT ?{}", args.len()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
        |row| {
            Ok(TxLogEntry {
                id: row.get(0)?,
                member_id: row.get(1)?,
                amount: row.get(2)?,
                description: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Members that have a ledger row, ascending.
pub fn ledger_member_ids(conn: &Connection) -> LedgerResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT member_id FROM member_ledgers ORDER BY member_id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Signed sum of a member's transaction log.
pub fn sum_tx_log(conn: &Connection, member_id: i64) -> LedgerResult<f64> {
    let total: Option<f64> = conn.query_row(
        "SELECT SUM(amount) FROM transaction_log WHERE member_id = ?1",
        params![member_id],
        |row| row.get(0),
    )?;
    Ok(round2(total.unwrap_or(0.0)))
}
