//! Demo walk-through of the ledger engine.
//!
//! Opens the database given as the first argument (in-memory when omitted),
//! registers a person with one account, posts a credit and a debit, and shows
//! the close gate at work.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ledgerkeep::{Account, AccountStore, Db, Person, PersonStore, Transaction, TransactionStore};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = match env::args().nth(1) {
        Some(path) => Db::open(path)?,
        None => Db::open_in_memory()?,
    };

    let persons = PersonStore::new(db.clone());
    let accounts = AccountStore::new(db.clone(), Arc::new(persons.clone()));
    let transactions = TransactionStore::new(db, accounts.clone());

    let person_id = match persons.get_by_id_number("8001015009087")? {
        Some(person) => person.id,
        None => persons.create(&Person {
            id: 0,
            id_number: "8001015009087".to_string(),
            first_name: "Thabo".to_string(),
            surname: "Mokoena".to_string(),
            address: Some("12 Long Street, Cape Town".to_string()),
            phone_number: None,
            email: Some("thabo@example.com".to_string()),
        })?,
    };

    let account_id = match accounts.get_by_account_number("ACC-001")? {
        Some(account) => account.id,
        None => accounts.create(&Account::new("ACC-001", "Cheque account", person_id))?,
    };

    let today = Utc::now().date_naive();
    transactions.create(&Transaction::credit(
        account_id,
        today,
        Decimal::new(500_00, 2),
        "Opening deposit",
    ))?;
    transactions.create(&Transaction::debit(
        account_id,
        today,
        Decimal::new(120_50, 2),
        "Card purchase",
    ))?;

    let account = accounts
        .get_by_id(account_id)?
        .expect("account was just created");
    println!(
        "{} ({}): balance {}",
        account.account_number, account.account_name, account.outstanding_balance
    );
    println!("can close now: {}", accounts.can_close(account_id)?);

    for posting in transactions.get_by_account_id(account_id)? {
        println!(
            "  {} {} {:>10}  {}",
            posting.transaction_date,
            posting.kind().as_str(),
            posting.amount(),
            posting.description
        );
    }

    Ok(())
}
