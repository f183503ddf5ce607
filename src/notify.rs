//! Member notifications.
//!
//! Notifications are plain rows written inside the same transaction as the
//! ledger change they describe. Delivery (push, email, websocket) belongs to
//! whatever reads this table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PackagePurchased,
    CommissionEarned,
    PackageClaimed,
    WithdrawalRequested,
    WithdrawalApproved,
    WithdrawalRejected,
    DepositApproved,
    DepositRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PackagePurchased => "package_purchased",
            NotificationKind::CommissionEarned => "commission_earned",
            NotificationKind::PackageClaimed => "package_claimed",
            NotificationKind::WithdrawalRequested => "withdrawal_requested",
            NotificationKind::WithdrawalApproved => "withdrawal_approved",
            NotificationKind::WithdrawalRejected => "withdrawal_rejected",
            NotificationKind::DepositApproved => "deposit_approved",
            NotificationKind::DepositRejected => "deposit_rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "package_purchased" => Some(NotificationKind::PackagePurchased),
            "commission_earned" => Some(NotificationKind::CommissionEarned),
            "package_claimed" => Some(NotificationKind::PackageClaimed),
            "withdrawal_requested" => Some(NotificationKind::WithdrawalRequested),
            "withdrawal_approved" => Some(NotificationKind::WithdrawalApproved),
            "withdrawal_rejected" => Some(NotificationKind::WithdrawalRejected),
            "deposit_approved" => Some(NotificationKind::DepositApproved),
            "deposit_rejected" => Some(NotificationKind::DepositRejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    pub member_id: i64,
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Queue a notification for `member_id`.
pub fn push(
    conn: &Connection,
    member_id: i64,
    kind: NotificationKind,
    message: &str,
    now: DateTime<Utc>,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO notifications (member_id, kind, message, is_read, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![member_id, kind, message, now],
    )?;
    tracing::debug!(
        "[NOTIFY] member={} kind={} message={}",
        member_id,
        kind.as_str(),
        message
    );
    Ok(conn.last_insert_rowid())
}

/// Newest first.
pub fn list_notifications(
    conn: &Connection,
    member_id: i64,
    unread_only: bool,
) -> LedgerResult<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, member_id, kind, message, is_read, created_at FROM notifications
         WHERE member_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map(params![member_id, unread_only], |row| {
            Ok(Notification {
                id: row.get(0)?,
                member_id: row.get(1)?,
                kind: row.get(2)?,
                message: row.get(3)?,
                is_read: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_read(conn: &Connection, member_id: i64) -> LedgerResult<usize> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE member_id = ?1 AND is_read = 0",
        params![member_id],
    )?;
    Ok(changed)
}
