//! Shared SQLite handle and schema setup.
//!
//! All three stores operate on one database. The handle is cheap to clone;
//! each store operation takes the lock exactly once, so a multi-step write
//! (validate, persist, recompute) is a single unit of work against a single
//! connection.

use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to the ledger database.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) a ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for crash recovery on disk-backed databases.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::init(conn)
    }

    /// Open an ephemeral in-memory ledger. Used by the test suites.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        setup_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Create the three entity tables if they are missing.
///
/// Uniqueness of `persons.id_number` and `accounts.account_number` is enforced
/// here as the storage-level backstop behind the stores' existence checks.
/// Person deletion is restricted while accounts reference the person; deleting
/// an account cascades to its transactions.
fn setup_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS persons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            id_number TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            surname TEXT NOT NULL,
            address TEXT,
            phone_number TEXT,
            email TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_number TEXT NOT NULL UNIQUE,
            account_name TEXT NOT NULL,
            outstanding_balance TEXT NOT NULL DEFAULT '0.00',
            status TEXT NOT NULL DEFAULT 'Open' CHECK (status IN ('Open', 'Closed')),
            person_id INTEGER NOT NULL REFERENCES persons(id) ON DELETE RESTRICT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_date TEXT NOT NULL,
            debit_amount TEXT NOT NULL,
            credit_amount TEXT NOT NULL,
            description TEXT NOT NULL,
            capture_date TEXT NOT NULL,
            account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_accounts_person ON accounts(person_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date)",
        [],
    )?;

    Ok(())
}

/// Read a fixed-point amount stored as TEXT.
pub(crate) fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    text.parse::<Decimal>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Render an amount for storage, normalized to 2 fractional digits.
pub(crate) fn decimal_text(value: Decimal) -> String {
    let mut v = value.round_dp(2);
    v.rescale(2);
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_text_normalizes_to_two_places() {
        assert_eq!(decimal_text(dec!(500)), "500.00");
        assert_eq!(decimal_text(dec!(0)), "0.00");
        assert_eq!(decimal_text(dec!(-12.5)), "-12.50");
        assert_eq!(decimal_text(dec!(1.005)), "1.00");
    }

    #[test]
    fn schema_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_schema(&conn).unwrap();
        setup_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('persons', 'accounts', 'transactions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn account_number_is_unique_at_storage_level() {
        let conn = Connection::open_in_memory().unwrap();
        setup_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO persons (id_number, first_name, surname) VALUES ('8001015009087', 'A', 'B')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO accounts (account_number, account_name, person_id) VALUES ('ACC-001', 'Cheque', 1)",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO accounts (account_number, account_name, person_id) VALUES ('ACC-001', 'Other', 1)",
            [],
        );
        assert!(dup.is_err());
    }
}
