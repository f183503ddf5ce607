//! Package catalogue, package connections (purchases) and the commission log.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;
use crate::money::round2;
use crate::referral::chain::CommissionType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,
    pub name: String,
    /// Maturity payout as a percentage of the principal
    pub percentage: f64,
    /// Days until the connection can be claimed
    pub days: i64,
    pub is_enabled: bool,
}

/// Insert a package (`id == None`) or overwrite an existing one. Returns its id.
pub fn upsert_package(
    conn: &Connection,
    id: Option<i64>,
    name: &str,
    percentage: f64,
    days: i64,
    is_enabled: bool,
) -> LedgerResult<i64> {
    match id {
        Some(id) => {
            conn.execute(
                "INSERT INTO packages (id, name, percentage, days, is_enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     percentage = excluded.percentage,
                     days = excluded.days,
                     is_enabled = excluded.is_enabled",
                params![id, name, percentage, days, is_enabled],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO packages (name, percentage, days, is_enabled) VALUES (?1, ?2, ?3, ?4)",
                params![name, percentage, days, is_enabled],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

pub fn fetch_package(conn: &Connection, package_id: i64) -> LedgerResult<Option<Package>> {
    let package = conn
        .query_row(
            "SELECT id, name, percentage, days, is_enabled FROM packages WHERE id = ?1",
            params![package_id],
            |row| {
                Ok(Package {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    percentage: row.get(2)?,
                    days: row.get(3)?,
                    is_enabled: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(package)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    Active,
    Ended,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "ACTIVE",
            ConnectionStatus::Ended => "ENDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(ConnectionStatus::Active),
            "ENDED" => Some(ConnectionStatus::Ended),
            _ => None,
        }
    }
}

/// One purchase of a package by a member.
#[derive(Debug, Clone, Serialize)]
pub struct PackageConnection {
    pub id: i64,
    pub member_id: i64,
    pub package_id: i64,
    pub amount: f64,
    pub earnings: f64,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub completion_deadline: DateTime<Utc>,
    pub is_reinvestment: bool,
    pub is_ready_to_claim: bool,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl PackageConnection {
    pub fn is_matured(&self, now: DateTime<Utc>) -> bool {
        now >= self.completion_deadline
    }

    /// Principal plus maturity earnings.
    pub fn payout(&self) -> f64 {
        round2(self.amount + self.earnings)
    }
}

const CONNECTION_COLUMNS: &str = "id, member_id, package_id, amount, earnings, status, created_at,
     completion_deadline, is_reinvestment, is_ready_to_claim, claimed_at";

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<PackageConnection> {
    Ok(PackageConnection {
        id: row.get(0)?,
        member_id: row.get(1)?,
        package_id: row.get(2)?,
        amount: row.get(3)?,
        earnings: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        completion_deadline: row.get(7)?,
        is_reinvestment: row.get(8)?,
        is_ready_to_claim: row.get(9)?,
        claimed_at: row.get(10)?,
    })
}

/// Fields supplied when a purchase creates a connection.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub member_id: i64,
    pub package_id: i64,
    pub amount: f64,
    pub earnings: f64,
    pub created_at: DateTime<Utc>,
    pub completion_deadline: DateTime<Utc>,
    pub is_reinvestment: bool,
}

pub fn insert_connection(conn: &Connection, new: &NewConnection) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO package_connections
             (member_id, package_id, amount, earnings, status, created_at,
              completion_deadline, is_reinvestment, is_ready_to_claim)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
        params![
            new.member_id,
            new.package_id,
            round2(new.amount),
            round2(new.earnings),
            ConnectionStatus::Active,
            new.created_at,
            new.completion_deadline,
            new.is_reinvestment
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_connection(
    conn: &Connection,
    connection_id: i64,
) -> LedgerResult<Option<PackageConnection>> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM package_connections WHERE id = ?1");
    let found = conn
        .query_row(&sql, params![connection_id], connection_from_row)
        .optional()?;
    Ok(found)
}

pub fn list_connections(conn: &Connection, member_id: i64) -> LedgerResult<Vec<PackageConnection>> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM package_connections WHERE member_id = ?1 ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![member_id], connection_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_active_connections(conn: &Connection, member_id: i64) -> LedgerResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM package_connections WHERE member_id = ?1 AND status = ?2",
        params![member_id, ConnectionStatus::Active],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// ACTIVE -> ENDED. Returns false when the row was not ACTIVE.
pub fn end_connection(conn: &Connection, connection_id: i64, now: DateTime<Utc>) -> LedgerResult<bool> {
    let changed = conn.execute(
        "UPDATE package_connections
         SET status = ?2, claimed_at = ?3, is_ready_to_claim = 0
         WHERE id = ?1 AND status = ?4",
        params![connection_id, ConnectionStatus::Ended, now, ConnectionStatus::Active],
    )?;
    Ok(changed == 1)
}

/// Flag every ACTIVE connection whose deadline has passed. Returns rows flagged.
pub fn mark_ready_to_claim(conn: &Connection, now: DateTime<Utc>) -> LedgerResult<usize> {
    let flagged = conn.execute(
        "UPDATE package_connections SET is_ready_to_claim = 1
         WHERE status = ?1 AND is_ready_to_claim = 0 AND completion_deadline <= ?2",
        params![ConnectionStatus::Active, now],
    )?;
    Ok(flagged)
}

/// One commission credit written at purchase time.
#[derive(Debug, Clone, Serialize)]
pub struct CommissionEntry {
    pub connection_id: i64,
    pub purchaser_id: i64,
    pub referrer_id: i64,
    pub level: usize,
    pub percentage: f64,
    pub earnings: f64,
    pub commission_type: CommissionType,
}

pub fn insert_commission(
    conn: &Connection,
    entry: &CommissionEntry,
    now: DateTime<Utc>,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO commission_log
             (connection_id, purchaser_id, referrer_id, level, percentage, earnings,
              commission_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.connection_id,
            entry.purchaser_id,
            entry.referrer_id,
            entry.level as i64,
            entry.percentage,
            round2(entry.earnings),
            entry.commission_type,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn commissions_for_connection(
    conn: &Connection,
    connection_id: i64,
) -> LedgerResult<Vec<CommissionEntry>> {
    let mut stmt = conn.prepare(
        "SELECT connection_id, purchaser_id, referrer_id, level, percentage, earnings, commission_type
         FROM commission_log WHERE connection_id = ?1 ORDER BY level",
    )?;
    let rows = stmt
        .query_map(params![connection_id], |row| {
            Ok(CommissionEntry {
                connection_id: row.get(0)?,
                purchaser_id: row.get(1)?,
                referrer_id: row.get(2)?,
                level: row.get::<_, i64>(3)? as usize,
                percentage: row.get(4)?,
                earnings: row.get(5)?,
                commission_type: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
