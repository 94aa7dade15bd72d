//! Ledger consistency engine.
//!
//! Records people, the accounts they hold, and the debit/credit postings
//! against those accounts, and keeps three things true under mutation:
//!
//! - an account's outstanding balance always equals the sum of its credits
//!   minus its debits;
//! - an account closes only at a zero balance, and never reopens;
//! - a person is removed only once every account they own is closed.
//!
//! The engine is a plain in-process API over SQLite. It knows nothing about
//! HTTP, sessions or display formatting; callers are expected to have been
//! authenticated elsewhere, and everything they send is re-validated here.

pub mod db;
pub mod entities;
pub mod error;

pub use db::Db;
pub use entities::{
    Account, AccountStatus, AccountStore, Person, PersonLookup, PersonStore, Transaction,
    TransactionKind, TransactionStore,
};
pub use error::{StoreError, StoreResult, ValidationError};
