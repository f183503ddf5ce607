//! Members, staff roles and referral edges.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Member role, resolved upstream and stored for approver/merchant lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Member,
    /// Staff who decide withdrawals
    Approver,
    /// Staff who approve top-ups out of their own float
    Merchant,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "MEMBER",
            Role::Approver => "APPROVER",
            Role::Merchant => "MERCHANT",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "MEMBER" => Some(Role::Member),
            "APPROVER" => Some(Role::Approver),
            "MERCHANT" => Some(Role::Merchant),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Staff may decide withdrawal and top-up requests.
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Member)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub is_active_member: bool,
    pub created_at: DateTime<Utc>,
}

pub fn insert_member(
    conn: &Connection,
    username: &str,
    role: Role,
    now: DateTime<Utc>,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO members (username, role, is_active_member, created_at) VALUES (?1, ?2, 0, ?3)",
        params![username, role, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_member(conn: &Connection, member_id: i64) -> LedgerResult<Option<Member>> {
    let member = conn
        .query_row(
            "SELECT id, username, role, is_active_member, created_at FROM members WHERE id = ?1",
            params![member_id],
            |row| {
                Ok(Member {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    role: row.get(2)?,
                    is_active_member: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(member)
}

/// Like [`fetch_member`] but absent members are an error.
pub fn require_member(conn: &Connection, member_id: i64) -> LedgerResult<Member> {
    fetch_member(conn, member_id)?.ok_or(LedgerError::MemberNotFound(member_id))
}

/// Staff member allowed to decide a request raised by `owner_id`.
/// Plain members and the request's own member are refused.
pub fn require_decider(
    conn: &Connection,
    decider_id: i64,
    owner_id: i64,
    request_id: i64,
) -> LedgerResult<Member> {
    let decider = require_member(conn, decider_id)?;
    if !decider.role.is_staff() || decider.id == owner_id {
        return Err(LedgerError::NotAuthorized {
            member_id: decider_id,
            request_id,
        });
    }
    Ok(decider)
}

pub fn set_active_member(conn: &Connection, member_id: i64, active: bool) -> LedgerResult<()> {
    conn.execute(
        "UPDATE members SET is_active_member = ?2 WHERE id = ?1",
        params![member_id, active],
    )?;
    Ok(())
}

/// Member ids holding `role`, lowest id first.
pub fn members_with_role(conn: &Connection, role: Role) -> LedgerResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM members WHERE role = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map(params![role], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Record that `member_id` registered under `from_member_id`.
pub fn insert_referral(
    conn: &Connection,
    member_id: i64,
    from_member_id: i64,
    hierarchy: &str,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO referrals (member_id, from_member_id, hierarchy) VALUES (?1, ?2, ?3)",
        params![member_id, from_member_id, hierarchy],
    )?;
    Ok(())
}

/// Stored ancestry path; `None` for members who joined without a referrer.
pub fn load_hierarchy(conn: &Connection, member_id: i64) -> LedgerResult<Option<String>> {
    let hierarchy = conn
        .query_row(
            "SELECT hierarchy FROM referrals WHERE member_id = ?1",
            params![member_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hierarchy)
}

/// Direct upline, if any.
pub fn direct_referrer(conn: &Connection, member_id: i64) -> LedgerResult<Option<i64>> {
    let from = conn
        .query_row(
            "SELECT from_member_id FROM referrals WHERE member_id = ?1",
            params![member_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(from)
}
