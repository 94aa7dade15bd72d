//! Entity models and their stores.
//!
//! Dependencies run leaves-first: `person` stands alone, `account` confirms
//! owners through the [`person::PersonLookup`] capability, and `transaction`
//! leans on `account` for status checks and balance recomputation. Nothing
//! depends on the transaction store.

pub mod account;
pub mod person;
pub mod transaction;

pub use account::{Account, AccountStatus, AccountStore};
pub use person::{Person, PersonLookup, PersonStore};
pub use transaction::{Transaction, TransactionKind, TransactionStore};

use crate::error::ValidationError;

/// Field must be present (non-blank) and within `max` characters.
pub(crate) fn check_required(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    check_len(field, value, max)
}

/// Optional field, but still bounded when present.
pub(crate) fn check_optional(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(v) => check_len(field, v, max),
        None => Ok(()),
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_rejects_blank_values() {
        assert_eq!(
            check_required("surname", "   ", 100),
            Err(ValidationError::Required { field: "surname" })
        );
        assert!(check_required("surname", "Mokoena", 100).is_ok());
    }

    #[test]
    fn length_limits_count_characters() {
        let long = "x".repeat(21);
        assert_eq!(
            check_required("account number", &long, 20),
            Err(ValidationError::TooLong {
                field: "account number",
                max: 20
            })
        );
        assert!(check_optional("address", None, 200).is_ok());
        assert!(check_optional("address", Some("12 Short St"), 200).is_ok());
    }
}
