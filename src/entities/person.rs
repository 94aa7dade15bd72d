//! Person records and the rules that govern them.
//!
//! A person is deletable only when they own no accounts, or every account
//! they own is closed. Deleting a person removes their closed accounts (and,
//! through the storage cascade, the transactions on those accounts) in the
//! same unit of work.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::Db;
use crate::entities::{check_optional, check_required};
use crate::error::{StoreError, StoreResult, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Store-assigned identity; ignored on create.
    pub id: i64,
    /// Exactly 13 characters, unique across all persons.
    pub id_number: String,
    pub first_name: String,
    pub surname: String,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

/// Owner-existence capability injected into the account store, so accounts
/// can confirm a person exists without navigating person records directly.
pub trait PersonLookup: Send + Sync {
    fn person_exists(&self, conn: &Connection, id: i64) -> rusqlite::Result<bool>;
}

#[derive(Clone)]
pub struct PersonStore {
    db: Db,
}

impl PersonStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Persist a new person. Fails if the ID number is already registered.
    /// Returns the store-assigned id.
    pub fn create(&self, person: &Person) -> StoreResult<i64> {
        validate_fields(person)?;

        let conn = self.db.lock();
        if id_number_taken(&conn, &person.id_number, None)? {
            return Err(ValidationError::DuplicateIdNumber(person.id_number.clone()).into());
        }

        conn.execute(
            "INSERT INTO persons (id_number, first_name, surname, address, phone_number, email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                person.id_number,
                person.first_name,
                person.surname,
                person.address,
                person.phone_number,
                person.email,
            ],
        )?;
        let id = conn.last_insert_rowid();

        debug!(person_id = id, "person created");
        Ok(id)
    }

    /// Rewrite a person's details. The uniqueness check excludes the person's
    /// own row, so keeping the same ID number is not a conflict.
    pub fn update(&self, person: &Person) -> StoreResult<()> {
        validate_fields(person)?;

        let conn = self.db.lock();
        if id_number_taken(&conn, &person.id_number, Some(person.id))? {
            return Err(ValidationError::DuplicateIdNumber(person.id_number.clone()).into());
        }

        let changed = conn.execute(
            "UPDATE persons
             SET id_number = ?1, first_name = ?2, surname = ?3,
                 address = ?4, phone_number = ?5, email = ?6
             WHERE id = ?7",
            params![
                person.id_number,
                person.first_name,
                person.surname,
                person.address,
                person.phone_number,
                person.email,
                person.id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("person", person.id));
        }

        debug!(person_id = person.id, "person updated");
        Ok(())
    }

    /// Remove a person, together with their closed accounts and the postings
    /// on those accounts. Refused while any account is still open.
    pub fn delete(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;

        match deletable_on(&tx, id)? {
            None => return Err(StoreError::not_found("person", id)),
            Some(false) => {
                warn!(person_id = id, "delete refused: open accounts remain");
                return Err(ValidationError::OpenAccountsRemain.into());
            }
            Some(true) => {}
        }

        // Any remaining accounts are closed; their transactions go via the
        // storage-level cascade.
        tx.execute("DELETE FROM accounts WHERE person_id = ?1", params![id])?;
        tx.execute("DELETE FROM persons WHERE id = ?1", params![id])?;
        tx.commit()?;

        debug!(person_id = id, "person deleted");
        Ok(())
    }

    pub fn get_by_id(&self, id: i64) -> StoreResult<Option<Person>> {
        let conn = self.db.lock();
        let person = conn
            .query_row(
                "SELECT id, id_number, first_name, surname, address, phone_number, email
                 FROM persons WHERE id = ?1",
                params![id],
                row_to_person,
            )
            .optional()?;
        Ok(person)
    }

    pub fn get_by_id_number(&self, id_number: &str) -> StoreResult<Option<Person>> {
        let conn = self.db.lock();
        let person = conn
            .query_row(
                "SELECT id, id_number, first_name, surname, address, phone_number, email
                 FROM persons WHERE id_number = ?1",
                params![id_number],
                row_to_person,
            )
            .optional()?;
        Ok(person)
    }

    /// Substring match on surname, ordered by surname ascending.
    pub fn search_by_surname(&self, surname: &str) -> StoreResult<Vec<Person>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, id_number, first_name, surname, address, phone_number, email
             FROM persons
             WHERE surname LIKE '%' || ?1 || '%'
             ORDER BY surname ASC",
        )?;
        let persons = stmt
            .query_map(params![surname], row_to_person)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(persons)
    }

    pub fn get_all(&self) -> StoreResult<Vec<Person>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, id_number, first_name, surname, address, phone_number, email
             FROM persons ORDER BY surname ASC",
        )?;
        let persons = stmt
            .query_map([], row_to_person)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(persons)
    }

    /// Whether an ID number is already registered, optionally ignoring one
    /// person's own row (for updates).
    pub fn id_number_exists(&self, id_number: &str, exclude: Option<i64>) -> StoreResult<bool> {
        let conn = self.db.lock();
        Ok(id_number_taken(&conn, id_number, exclude)?)
    }

    /// True iff the person exists and has no open accounts. Missing persons
    /// are not deletable.
    pub fn can_delete(&self, id: i64) -> StoreResult<bool> {
        let conn = self.db.lock();
        Ok(deletable_on(&conn, id)?.unwrap_or(false))
    }
}

impl PersonLookup for PersonStore {
    fn person_exists(&self, conn: &Connection, id: i64) -> rusqlite::Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM persons WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn validate_fields(person: &Person) -> Result<(), ValidationError> {
    if person.id_number.chars().count() != 13 {
        return Err(ValidationError::IdNumberLength);
    }
    check_required("first name", &person.first_name, 100)?;
    check_required("surname", &person.surname, 100)?;
    check_optional("address", person.address.as_deref(), 200)?;
    check_optional("phone number", person.phone_number.as_deref(), 20)?;
    check_optional("email", person.email.as_deref(), 100)?;
    Ok(())
}

fn id_number_taken(
    conn: &Connection,
    id_number: &str,
    exclude: Option<i64>,
) -> rusqlite::Result<bool> {
    let count: i64 = match exclude {
        Some(id) => conn.query_row(
            "SELECT COUNT(*) FROM persons WHERE id_number = ?1 AND id <> ?2",
            params![id_number, id],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM persons WHERE id_number = ?1",
            params![id_number],
            |row| row.get(0),
        )?,
    };
    Ok(count > 0)
}

/// `None` if the person is missing; otherwise whether every account they own
/// (possibly none) is closed.
fn deletable_on(conn: &Connection, id: i64) -> rusqlite::Result<Option<bool>> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM persons WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(None);
    }

    let open: i64 = conn.query_row(
        "SELECT COUNT(*) FROM accounts WHERE person_id = ?1 AND status = 'Open'",
        params![id],
        |row| row.get(0),
    )?;
    Ok(Some(open == 0))
}

fn row_to_person(row: &Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get(0)?,
        id_number: row.get(1)?,
        first_name: row.get(2)?,
        surname: row.get(3)?,
        address: row.get(4)?,
        phone_number: row.get(5)?,
        email: row.get(6)?,
    })
}
