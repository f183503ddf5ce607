//! Ledger Store: SQLite-backed persistence for balances, requests and logs.
//!
//! RULE: only `store` talks SQL. Orchestrators open a transaction through
//! [`LedgerDb::with_tx`] and call the row helpers in the submodules with it.
//!
//! Locking: SQLite has no `SELECT ... FOR UPDATE`. Every mutating operation
//! runs in a `BEGIN IMMEDIATE` transaction, which takes the database write
//! lock before the first read and holds it until commit or rollback. Any other
//! connection (thread or process) that wants to write waits up to the busy
//! timeout. That is a superset of the member-row lock the orchestrators need.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};

pub mod funds;
pub mod ledger;
pub mod packages;
pub mod referral;
pub mod requests;

const SCHEMA: &str = include_str!("schema.sql");

/// Implement `ToSql`/`FromSql` for an enum stored as its `as_str()` text.
macro_rules! text_column {
    ($ty:ty) => {
        impl rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let raw = value.as_str()?;
                <$ty>::parse(raw).ok_or_else(|| {
                    rusqlite::types::FromSqlError::Other(
                        format!("unknown {} '{}'", stringify!($ty), raw).into(),
                    )
                })
            }
        }
    };
}

text_column!(crate::wallet::EarningsType);
text_column!(crate::referral::chain::CommissionType);
text_column!(crate::notify::NotificationKind);
text_column!(referral::Role);
text_column!(packages::ConnectionStatus);
text_column!(requests::RequestStatus);

/// One connection to the ledger database.
pub struct LedgerDb {
    conn: Connection,
}

impl LedgerDb {
    /// Open (or create) the database named in `config` and apply the schema.
    pub fn open(config: &EngineConfig) -> LedgerResult<Self> {
        let conn = Connection::open(&config.database_path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        // WAL: readers never block the single writer.
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        tracing::debug!("[LEDGER] journal_mode={}", mode);
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Private in-memory database (unit tests, dry runs).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> LedgerResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Connection for lock-free reads.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `op` inside an IMMEDIATE transaction.
    ///
    /// Commits when `op` returns `Ok`; any error rolls back every write made
    /// by `op` before it is handed back. Data-integrity errors are logged on
    /// the alert target.
    pub fn with_tx<T, F>(&mut self, label: &str, op: F) -> LedgerResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> LedgerResult<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        match op(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = tx.rollback() {
                    tracing::warn!("[LEDGER] {} rollback failed: {}", label, rb);
                }
                report_failure(label, &err);
                Err(err)
            }
        }
    }
}

fn report_failure(label: &str, err: &LedgerError) {
    if err.is_data_integrity() {
        tracing::error!(
            target: "ledger::alert",
            operation = label,
            kind = ?err.kind(),
            "[LEDGER] referral data integrity violation, transaction rolled back: {}",
            err
        );
    } else {
        tracing::debug!("[LEDGER] {} rolled back: {}", label, err);
    }
}
