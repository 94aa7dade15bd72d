//! Accounts, their open/closed lifecycle, and balance recomputation.
//!
//! The store owns two fields outright: `status` and `outstanding_balance`.
//! Callers never set either one. A new account starts open at zero; the
//! balance moves only through [`AccountStore::recompute_balance`] (or its
//! crate-internal form invoked by the transaction store), and the status
//! moves only through [`AccountStore::close`]. Closed is terminal.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::db::{self, Db};
use crate::entities::check_required;
use crate::entities::person::PersonLookup;
use crate::error::{StoreError, StoreResult, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Open,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Open => "Open",
            AccountStatus::Closed => "Closed",
        }
    }

    fn from_sql(text: &str, idx: usize) -> rusqlite::Result<Self> {
        match text {
            "Open" => Ok(AccountStatus::Open),
            "Closed" => Ok(AccountStatus::Closed),
            other => Err(rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("unknown account status: {other}").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned identity; ignored on create.
    pub id: i64,
    /// At most 20 characters, unique across all accounts.
    pub account_number: String,
    pub account_name: String,
    /// Always equals the sum of credits minus debits over the account's
    /// currently persisted transactions.
    pub outstanding_balance: Decimal,
    pub status: AccountStatus,
    /// Owning person; immutable after creation.
    pub person_id: i64,
}

impl Account {
    /// Convenience constructor for a create call. Balance and status are
    /// store-owned and forced on insert, whatever is passed here.
    pub fn new(
        account_number: impl Into<String>,
        account_name: impl Into<String>,
        person_id: i64,
    ) -> Self {
        Self {
            id: 0,
            account_number: account_number.into(),
            account_name: account_name.into(),
            outstanding_balance: Decimal::ZERO,
            status: AccountStatus::Open,
            person_id,
        }
    }
}

#[derive(Clone)]
pub struct AccountStore {
    db: Db,
    persons: Arc<dyn PersonLookup>,
}

impl AccountStore {
    pub fn new(db: Db, persons: Arc<dyn PersonLookup>) -> Self {
        Self { db, persons }
    }

    /// Persist a new account for an existing person. The stored row always
    /// starts open with a zero balance regardless of the caller's input.
    pub fn create(&self, account: &Account) -> StoreResult<i64> {
        check_required("account number", &account.account_number, 20)?;
        check_required("account name", &account.account_name, 100)?;

        let conn = self.db.lock();
        if !self.persons.person_exists(&conn, account.person_id)? {
            return Err(ValidationError::UnknownPerson(account.person_id).into());
        }
        if number_taken(&conn, &account.account_number, None)? {
            return Err(
                ValidationError::DuplicateAccountNumber(account.account_number.clone()).into(),
            );
        }

        conn.execute(
            "INSERT INTO accounts (account_number, account_name, outstanding_balance, status, person_id)
             VALUES (?1, ?2, '0.00', 'Open', ?3)",
            params![account.account_number, account.account_name, account.person_id],
        )?;
        let id = conn.last_insert_rowid();

        debug!(account_id = id, number = %account.account_number, "account created");
        Ok(id)
    }

    /// Rewrite the caller-editable fields: account number and name. Status,
    /// balance and owner are preserved from the stored row.
    pub fn update(&self, account: &Account) -> StoreResult<()> {
        check_required("account number", &account.account_number, 20)?;
        check_required("account name", &account.account_name, 100)?;

        let conn = self.db.lock();
        if number_taken(&conn, &account.account_number, Some(account.id))? {
            return Err(
                ValidationError::DuplicateAccountNumber(account.account_number.clone()).into(),
            );
        }

        let changed = conn.execute(
            "UPDATE accounts SET account_number = ?1, account_name = ?2 WHERE id = ?3",
            params![account.account_number, account.account_name, account.id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("account", account.id));
        }

        debug!(account_id = account.id, "account updated");
        Ok(())
    }

    /// True iff the account exists and its balance is exactly zero.
    pub fn can_close(&self, id: i64) -> StoreResult<bool> {
        let conn = self.db.lock();
        let balance = balance_on(&conn, id)?;
        Ok(matches!(balance, Some(b) if b == Decimal::ZERO))
    }

    /// Transition Open -> Closed. Refused for a missing account or any
    /// non-zero balance. There is no reopen.
    pub fn close(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;

        match balance_on(&tx, id)? {
            None => return Err(StoreError::not_found("account", id)),
            Some(balance) if balance != Decimal::ZERO => {
                warn!(account_id = id, %balance, "close refused: balance is not zero");
                return Err(ValidationError::NonZeroBalance.into());
            }
            Some(_) => {}
        }

        tx.execute(
            "UPDATE accounts SET status = 'Closed' WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;

        debug!(account_id = id, "account closed");
        Ok(())
    }

    pub fn get_by_id(&self, id: i64) -> StoreResult<Option<Account>> {
        let conn = self.db.lock();
        let account = conn
            .query_row(
                "SELECT id, account_number, account_name, outstanding_balance, status, person_id
                 FROM accounts WHERE id = ?1",
                params![id],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    pub fn get_by_account_number(&self, number: &str) -> StoreResult<Option<Account>> {
        let conn = self.db.lock();
        let account = conn
            .query_row(
                "SELECT id, account_number, account_name, outstanding_balance, status, person_id
                 FROM accounts WHERE account_number = ?1",
                params![number],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    /// All accounts owned by a person, ordered by account number.
    pub fn get_by_person_id(&self, person_id: i64) -> StoreResult<Vec<Account>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, account_number, account_name, outstanding_balance, status, person_id
             FROM accounts WHERE person_id = ?1 ORDER BY account_number ASC",
        )?;
        let accounts = stmt
            .query_map(params![person_id], row_to_account)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    pub fn get_all(&self) -> StoreResult<Vec<Account>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, account_number, account_name, outstanding_balance, status, person_id
             FROM accounts ORDER BY account_number ASC",
        )?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Whether an account number is already in use, optionally ignoring one
    /// account's own row (for updates).
    pub fn account_number_exists(&self, number: &str, exclude: Option<i64>) -> StoreResult<bool> {
        let conn = self.db.lock();
        Ok(number_taken(&conn, number, exclude)?)
    }

    /// Reload every transaction on the account, sum credits minus debits, and
    /// persist the result. The single source of truth for the balance
    /// invariant; never computed incrementally.
    pub fn recompute_balance(&self, id: i64) -> StoreResult<Decimal> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;

        let balance = match self.recompute_on(&tx, id) {
            Ok(Some(balance)) => balance,
            Ok(None) => return Err(StoreError::not_found("account", id)),
            Err(source) => {
                error!(account_id = id, %source, "balance recomputation failed");
                return Err(StoreError::BalanceRecompute {
                    account_id: id,
                    source,
                });
            }
        };
        tx.commit()?;

        Ok(balance)
    }

    /// Recompute within the caller's unit of work, so a transaction mutation
    /// and the balance it implies commit or roll back together. `None` when
    /// the account does not exist.
    pub(crate) fn recompute_on(
        &self,
        conn: &Connection,
        id: i64,
    ) -> rusqlite::Result<Option<Decimal>> {
        if balance_on(conn, id)?.is_none() {
            return Ok(None);
        }

        let mut stmt =
            conn.prepare("SELECT credit_amount, debit_amount FROM transactions WHERE account_id = ?1")?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((db::decimal_column(row, 0)?, db::decimal_column(row, 1)?))
        })?;

        let mut balance = Decimal::ZERO;
        for row in rows {
            let (credit, debit) = row?;
            balance += credit - debit;
        }

        conn.execute(
            "UPDATE accounts SET outstanding_balance = ?1 WHERE id = ?2",
            params![db::decimal_text(balance), id],
        )?;
        Ok(Some(balance))
    }

    /// Account status within the caller's unit of work. `None` when the
    /// account does not exist.
    pub(crate) fn status_on(
        &self,
        conn: &Connection,
        id: i64,
    ) -> rusqlite::Result<Option<AccountStatus>> {
        conn.query_row(
            "SELECT status FROM accounts WHERE id = ?1",
            params![id],
            |row| {
                let text: String = row.get(0)?;
                AccountStatus::from_sql(&text, 0)
            },
        )
        .optional()
    }
}

fn number_taken(conn: &Connection, number: &str, exclude: Option<i64>) -> rusqlite::Result<bool> {
    let count: i64 = match exclude {
        Some(id) => conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE account_number = ?1 AND id <> ?2",
            params![number, id],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE account_number = ?1",
            params![number],
            |row| row.get(0),
        )?,
    };
    Ok(count > 0)
}

fn balance_on(conn: &Connection, id: i64) -> rusqlite::Result<Option<Decimal>> {
    conn.query_row(
        "SELECT outstanding_balance FROM accounts WHERE id = ?1",
        params![id],
        |row| db::decimal_column(row, 0),
    )
    .optional()
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let status: String = row.get(4)?;
    Ok(Account {
        id: row.get(0)?,
        account_number: row.get(1)?,
        account_name: row.get(2)?,
        outstanding_balance: db::decimal_column(row, 3)?,
        status: AccountStatus::from_sql(&status, 4)?,
        person_id: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::person::{Person, PersonStore};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn stores() -> (PersonStore, AccountStore) {
        let db = Db::open_in_memory().unwrap();
        let persons = PersonStore::new(db.clone());
        let accounts = AccountStore::new(db, Arc::new(persons.clone()));
        (persons, accounts)
    }

    fn person(persons: &PersonStore) -> i64 {
        persons
            .create(&Person {
                id: 0,
                id_number: "8001015009087".to_string(),
                first_name: "Thabo".to_string(),
                surname: "Mokoena".to_string(),
                address: None,
                phone_number: None,
                email: None,
            })
            .unwrap()
    }

    #[test]
    fn create_forces_zero_balance_and_open_status() {
        let (persons, accounts) = stores();
        let person_id = person(&persons);

        // Caller tampering with store-owned fields gets ignored.
        let mut tampered = Account::new("ACC-001", "Cheque", person_id);
        tampered.outstanding_balance = dec!(9999.99);
        tampered.status = AccountStatus::Closed;

        let id = accounts.create(&tampered).unwrap();
        let stored = accounts.get_by_id(id).unwrap().unwrap();
        assert_eq!(stored.outstanding_balance, Decimal::ZERO);
        assert_eq!(stored.status, AccountStatus::Open);
    }

    #[test]
    fn create_rejects_unknown_person() {
        let (_persons, accounts) = stores();
        let err = accounts
            .create(&Account::new("ACC-001", "Cheque", 404))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::UnknownPerson(404))
        ));
    }

    #[test]
    fn create_rejects_duplicate_account_number() {
        let (persons, accounts) = stores();
        let person_id = person(&persons);
        accounts
            .create(&Account::new("ACC-001", "Cheque", person_id))
            .unwrap();

        let err = accounts
            .create(&Account::new("ACC-001", "Savings", person_id))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::DuplicateAccountNumber(_))
        ));
        assert_eq!(accounts.get_all().unwrap().len(), 1);
    }

    #[test]
    fn update_cannot_touch_status_balance_or_owner() {
        let (persons, accounts) = stores();
        let person_id = person(&persons);
        let id = accounts
            .create(&Account::new("ACC-001", "Cheque", person_id))
            .unwrap();
        accounts.close(id).unwrap();

        let mut edit = accounts.get_by_id(id).unwrap().unwrap();
        edit.account_name = "Renamed".to_string();
        edit.status = AccountStatus::Open;
        edit.outstanding_balance = dec!(100);
        edit.person_id = 404;
        accounts.update(&edit).unwrap();

        let stored = accounts.get_by_id(id).unwrap().unwrap();
        assert_eq!(stored.account_name, "Renamed");
        assert_eq!(stored.status, AccountStatus::Closed);
        assert_eq!(stored.outstanding_balance, Decimal::ZERO);
        assert_eq!(stored.person_id, person_id);
    }

    #[test]
    fn update_uniqueness_excludes_own_row() {
        let (persons, accounts) = stores();
        let person_id = person(&persons);
        let id = accounts
            .create(&Account::new("ACC-001", "Cheque", person_id))
            .unwrap();
        accounts
            .create(&Account::new("ACC-002", "Savings", person_id))
            .unwrap();

        // Keeping its own number is fine.
        let mut edit = accounts.get_by_id(id).unwrap().unwrap();
        edit.account_name = "Main cheque".to_string();
        accounts.update(&edit).unwrap();

        // Taking a sibling's number is not.
        edit.account_number = "ACC-002".to_string();
        let err = accounts.update(&edit).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::DuplicateAccountNumber(_))
        ));
    }

    #[test]
    fn close_gate_requires_zero_balance() {
        let (persons, accounts) = stores();
        let person_id = person(&persons);
        let id = accounts
            .create(&Account::new("ACC-001", "Cheque", person_id))
            .unwrap();

        assert!(accounts.can_close(id).unwrap());
        assert!(!accounts.can_close(999).unwrap());

        accounts.close(id).unwrap();
        assert_eq!(
            accounts.get_by_id(id).unwrap().unwrap().status,
            AccountStatus::Closed
        );

        let err = accounts.close(999).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn accounts_listed_by_account_number() {
        let (persons, accounts) = stores();
        let person_id = person(&persons);
        for number in ["ACC-300", "ACC-100", "ACC-200"] {
            accounts
                .create(&Account::new(number, "Cheque", person_id))
                .unwrap();
        }

        let all: Vec<_> = accounts
            .get_by_person_id(person_id)
            .unwrap()
            .into_iter()
            .map(|a| a.account_number)
            .collect();
        assert_eq!(all, vec!["ACC-100", "ACC-200", "ACC-300"]);
    }

    #[test]
    fn account_number_exists_honors_exclusion() {
        let (persons, accounts) = stores();
        let person_id = person(&persons);
        let id = accounts
            .create(&Account::new("ACC-001", "Cheque", person_id))
            .unwrap();

        assert!(accounts.account_number_exists("ACC-001", None).unwrap());
        assert!(!accounts.account_number_exists("ACC-001", Some(id)).unwrap());
        assert!(!accounts.account_number_exists("ACC-404", None).unwrap());
    }

    #[test]
    fn recompute_balance_on_missing_account_is_not_found() {
        let (_persons, accounts) = stores();
        let err = accounts.recompute_balance(12).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
