//! Journal repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide add / list / clear over the `journal` keyspace.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - The repository only operates on connections at the latest schema.
//! - Read paths reject rows whose id does not match their date and owner
//!   instead of masking them.
//! - `clear_entries` never touches the `identity` keyspace.
//! - Write paths refuse dates without a canonical text form, so every
//!   stored row can be read back.

use crate::codec;
use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::model::entry::{ClientId, Entry, EntryContent, EntryId, Mood};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ENTRY_SELECT_SQL: &str = "SELECT
    id,
    created_at,
    date,
    mood,
    text
FROM journal";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for journal persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
    /// An entry with the same derived id is already stored.
    DuplicateEntry(EntryId),
    /// The date cannot be stored in canonical form.
    DateOutOfRange(DateTime<Utc>),
    /// The blocking task running the operation did not complete.
    Aborted(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted entry data: {message}"),
            Self::DuplicateEntry(id) => write!(f, "entry already exists: {id}"),
            Self::DateOutOfRange(date) => write!(
                f,
                "date {date} is outside the storable years {}..={}",
                codec::CANONICAL_YEARS.start(),
                codec::CANONICAL_YEARS.end()
            ),
            Self::Aborted(message) => write!(f, "storage task aborted: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_)
            | Self::DuplicateEntry(_)
            | Self::DateOutOfRange(_)
            | Self::Aborted(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for journal entries.
pub trait JournalRepository {
    fn insert_entry(&self, entry: &Entry) -> RepoResult<EntryId>;
    fn list_entries(&self) -> RepoResult<Vec<Entry>>;
    /// Deletes every entry and returns how many were removed.
    fn clear_entries(&self) -> RepoResult<usize>;
}

/// SQLite-backed journal repository.
pub struct SqliteJournalRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteJournalRepository<'conn> {
    /// Constructs a repository from a connection migrated to the latest
    /// schema.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let version = schema_version(conn)?;
        if version != latest_version() {
            return Err(RepoError::InvalidData(format!(
                "journal layout is at schema {version}, expected {}",
                latest_version()
            )));
        }
        Ok(Self { conn })
    }
}

impl JournalRepository for SqliteJournalRepository<'_> {
    fn insert_entry(&self, entry: &Entry) -> RepoResult<EntryId> {
        ensure_storable(&entry.date())?;
        let result = self.conn.execute(
            "INSERT INTO journal (
                id,
                created_at,
                date,
                mood,
                text
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entry.id().to_string(),
                entry.created_at().to_string(),
                codec::iso8601(&entry.date()),
                entry.mood().level(),
                entry.text(),
            ],
        );

        match result {
            Ok(_) => Ok(entry.id()),
            Err(err) if is_constraint_violation(&err) => Err(RepoError::DuplicateEntry(entry.id())),
            Err(err) => Err(err.into()),
        }
    }

    fn list_entries(&self) -> RepoResult<Vec<Entry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ENTRY_SELECT_SQL} ORDER BY rowid ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();

        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }

        Ok(entries)
    }

    fn clear_entries(&self) -> RepoResult<usize> {
        let removed = self.conn.execute("DELETE FROM journal;", [])?;
        Ok(removed)
    }
}

/// Writes one row into a numeric-key layout (schema 1 or 2).
///
/// Returns the assigned legacy key.
pub(crate) fn insert_legacy_entry(
    conn: &Connection,
    date: &DateTime<Utc>,
    content: &EntryContent,
) -> RepoResult<i64> {
    ensure_storable(date)?;
    conn.execute(
        "INSERT INTO journal (date, mood, text) VALUES (?1, ?2, ?3);",
        params![
            codec::iso8601(date),
            content.mood.level(),
            content.text.as_str()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn ensure_storable(date: &DateTime<Utc>) -> RepoResult<()> {
    if codec::has_canonical_form(date) {
        Ok(())
    } else {
        Err(RepoError::DateOutOfRange(*date))
    }
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<Entry> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|_| RepoError::InvalidData(format!("invalid id `{id_text}` in journal.id")))?;

    let owner_text: String = row.get("created_at")?;
    let owner = owner_text.parse::<ClientId>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid client id `{owner_text}` in journal.created_at"
        ))
    })?;

    let date_text: String = row.get("date")?;
    let date = codec::parse_iso8601(&date_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid date `{date_text}` in journal.date"))
    })?;

    let mood_level: i64 = row.get("mood")?;
    let mood = Mood::try_from(mood_level)
        .map_err(|err| RepoError::InvalidData(format!("{err} in journal.mood")))?;

    let content = EntryContent::new(mood, row.get::<_, String>("text")?);
    Entry::from_stored(id, owner, date, content).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "id `{id_text}` does not match date and owner in journal"
        ))
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}
