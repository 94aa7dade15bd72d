//! Error taxonomy for the ledger stores.
//!
//! Business rule violations, missing rows, and storage faults are distinct
//! variants so callers can tell "rule violated" from "infrastructure broke".
//! A failed balance recomputation gets its own variant: it is the one failure
//! class that threatens the balance invariant rather than a single request.

use thiserror::Error;

/// Result type used across the stores.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A business rule rejected the operation. Storage is unchanged.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A mutation was aimed at a row that does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The persistence layer failed unexpectedly.
    #[error("storage fault: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Recomputing an account balance failed. The surrounding database
    /// transaction is rolled back, so the stale balance and the posting that
    /// triggered the refresh are discarded together.
    #[error("balance recomputation failed for account {account_id}")]
    BalanceRecompute {
        account_id: i64,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// True for business rule rejections, false for technical failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// A rejected business rule, with the reason callers show to users.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("ID number must be exactly 13 characters")]
    IdNumberLength,

    #[error("ID number {0} is already registered")]
    DuplicateIdNumber(String),

    #[error("account number {0} is already in use")]
    DuplicateAccountNumber(String),

    #[error("person {0} does not exist")]
    UnknownPerson(i64),

    #[error("account {0} does not exist")]
    UnknownAccount(i64),

    #[error("transaction date cannot be in the future")]
    DateInFuture,

    #[error("transaction amount cannot be zero")]
    ZeroAmount,

    #[error("transaction can be either debit or credit, not both")]
    DebitAndCredit,

    #[error("transaction amounts cannot be negative")]
    NegativeAmount,

    #[error("cannot post transactions to a closed account")]
    AccountClosed,

    #[error("account balance must be zero before closing")]
    NonZeroBalance,

    #[error("person still has open accounts")]
    OpenAccountsRemain,
}
