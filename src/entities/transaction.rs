//! Postings against accounts, and the rules every posting must pass.
//!
//! A posting carries a debit amount and a credit amount; exactly one of the
//! two is positive. Every create, update or delete recomputes the owning
//! account's balance inside the same database transaction, so the balance
//! invariant cannot be broken by a partial failure.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::db::{self, Db};
use crate::entities::account::{AccountStatus, AccountStore};
use crate::entities::check_required;
use crate::error::{StoreError, StoreResult, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Debit,
    Credit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "Debit",
            TransactionKind::Credit => "Credit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identity; ignored on create.
    pub id: i64,
    /// Calendar date of the posting; never in the future.
    pub transaction_date: NaiveDate,
    pub debit_amount: Decimal,
    pub credit_amount: Decimal,
    pub description: String,
    /// Audit timestamp, stamped by the store on every create and update.
    /// Caller-supplied values are overwritten.
    pub capture_date: DateTime<Utc>,
    /// Owning account; immutable after creation.
    pub account_id: i64,
}

impl Transaction {
    /// Convenience constructor for a debit posting.
    pub fn debit(
        account_id: i64,
        transaction_date: NaiveDate,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            transaction_date,
            debit_amount: amount,
            credit_amount: Decimal::ZERO,
            description: description.into(),
            capture_date: Utc::now(),
            account_id,
        }
    }

    /// Convenience constructor for a credit posting.
    pub fn credit(
        account_id: i64,
        transaction_date: NaiveDate,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            transaction_date,
            debit_amount: Decimal::ZERO,
            credit_amount: amount,
            description: description.into(),
            capture_date: Utc::now(),
            account_id,
        }
    }

    /// Whichever side of the posting is non-zero.
    pub fn amount(&self) -> Decimal {
        if self.debit_amount != Decimal::ZERO {
            self.debit_amount
        } else {
            self.credit_amount
        }
    }

    pub fn kind(&self) -> TransactionKind {
        if self.debit_amount != Decimal::ZERO {
            TransactionKind::Debit
        } else {
            TransactionKind::Credit
        }
    }
}

#[derive(Clone)]
pub struct TransactionStore {
    db: Db,
    accounts: AccountStore,
}

impl TransactionStore {
    pub fn new(db: Db, accounts: AccountStore) -> Self {
        Self { db, accounts }
    }

    /// Validate and persist a posting, stamp its capture date, and refresh the
    /// owning account's balance. All inside one database transaction.
    pub fn create(&self, posting: &Transaction) -> StoreResult<i64> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;

        self.validate_on(&tx, posting, posting.account_id)?;

        let capture_date = Utc::now();
        tx.execute(
            "INSERT INTO transactions
                 (transaction_date, debit_amount, credit_amount, description, capture_date, account_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                posting.transaction_date,
                db::decimal_text(posting.debit_amount),
                db::decimal_text(posting.credit_amount),
                posting.description,
                capture_date,
                posting.account_id,
            ],
        )?;
        let id = tx.last_insert_rowid();

        self.refresh_balance(&tx, posting.account_id)?;
        tx.commit()?;

        debug!(transaction_id = id, account_id = posting.account_id, "transaction created");
        Ok(id)
    }

    /// Re-validate and rewrite a posting. The owning account comes from the
    /// stored row; a caller-supplied `account_id` cannot move a posting to
    /// another account.
    pub fn update(&self, posting: &Transaction) -> StoreResult<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;

        let account_id: i64 = match tx
            .query_row(
                "SELECT account_id FROM transactions WHERE id = ?1",
                params![posting.id],
                |row| row.get(0),
            )
            .optional()?
        {
            Some(account_id) => account_id,
            None => return Err(StoreError::not_found("transaction", posting.id)),
        };

        self.validate_on(&tx, posting, account_id)?;

        let capture_date = Utc::now();
        tx.execute(
            "UPDATE transactions
             SET transaction_date = ?1, debit_amount = ?2, credit_amount = ?3,
                 description = ?4, capture_date = ?5
             WHERE id = ?6",
            params![
                posting.transaction_date,
                db::decimal_text(posting.debit_amount),
                db::decimal_text(posting.credit_amount),
                posting.description,
                capture_date,
                posting.id,
            ],
        )?;

        self.refresh_balance(&tx, account_id)?;
        tx.commit()?;

        debug!(transaction_id = posting.id, account_id, "transaction updated");
        Ok(())
    }

    /// Remove a posting and refresh the balance it contributed to.
    pub fn delete(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;

        let account_id: i64 = match tx
            .query_row(
                "SELECT account_id FROM transactions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
        {
            Some(account_id) => account_id,
            None => return Err(StoreError::not_found("transaction", id)),
        };

        tx.execute("DELETE FROM transactions WHERE id = ?1", params![id])?;
        self.refresh_balance(&tx, account_id)?;
        tx.commit()?;

        debug!(transaction_id = id, account_id, "transaction deleted");
        Ok(())
    }

    pub fn get_by_id(&self, id: i64) -> StoreResult<Option<Transaction>> {
        let conn = self.db.lock();
        let posting = conn
            .query_row(
                "SELECT id, transaction_date, debit_amount, credit_amount, description, capture_date, account_id
                 FROM transactions WHERE id = ?1",
                params![id],
                row_to_transaction,
            )
            .optional()?;
        Ok(posting)
    }

    /// Postings for one account, most recent transaction date first.
    pub fn get_by_account_id(&self, account_id: i64) -> StoreResult<Vec<Transaction>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, transaction_date, debit_amount, credit_amount, description, capture_date, account_id
             FROM transactions WHERE account_id = ?1
             ORDER BY transaction_date DESC",
        )?;
        let postings = stmt
            .query_map(params![account_id], row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    pub fn get_all(&self) -> StoreResult<Vec<Transaction>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, transaction_date, debit_amount, credit_amount, description, capture_date, account_id
             FROM transactions
             ORDER BY transaction_date DESC",
        )?;
        let postings = stmt
            .query_map([], row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    /// Run the posting rules without persisting anything. The `Err` carries
    /// the first rule that failed, in evaluation order.
    pub fn validate(&self, posting: &Transaction) -> StoreResult<()> {
        let conn = self.db.lock();
        self.validate_on(&conn, posting, posting.account_id)
    }

    /// A missing account is reported as not closed, matching the getter
    /// semantics for absent rows.
    pub fn is_account_closed(&self, account_id: i64) -> StoreResult<bool> {
        let conn = self.db.lock();
        let status = self.accounts.status_on(&conn, account_id)?;
        Ok(matches!(status, Some(AccountStatus::Closed)))
    }

    fn validate_on(
        &self,
        conn: &Connection,
        posting: &Transaction,
        account_id: i64,
    ) -> StoreResult<()> {
        check_required("description", &posting.description, 500)?;
        if posting.debit_amount < Decimal::ZERO || posting.credit_amount < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount.into());
        }
        if posting.transaction_date > Utc::now().date_naive() {
            return Err(ValidationError::DateInFuture.into());
        }
        if posting.debit_amount == Decimal::ZERO && posting.credit_amount == Decimal::ZERO {
            return Err(ValidationError::ZeroAmount.into());
        }
        if posting.debit_amount > Decimal::ZERO && posting.credit_amount > Decimal::ZERO {
            return Err(ValidationError::DebitAndCredit.into());
        }
        match self.accounts.status_on(conn, account_id)? {
            None => Err(ValidationError::UnknownAccount(account_id).into()),
            Some(AccountStatus::Closed) => Err(ValidationError::AccountClosed.into()),
            Some(AccountStatus::Open) => Ok(()),
        }
    }

    fn refresh_balance(&self, conn: &Connection, account_id: i64) -> StoreResult<()> {
        match self.accounts.recompute_on(conn, account_id) {
            Ok(_) => Ok(()),
            Err(source) => {
                error!(account_id, %source, "balance recomputation failed; rolling back posting");
                Err(StoreError::BalanceRecompute { account_id, source })
            }
        }
    }
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        transaction_date: row.get(1)?,
        debit_amount: db::decimal_column(row, 2)?,
        credit_amount: db::decimal_column(row, 3)?,
        description: row.get(4)?,
        capture_date: row.get(5)?,
        account_id: row.get(6)?,
    })
}
