use chrono::{TimeZone, Utc};
use moodjournal_core::db::migrations::{latest_version, schema_version, MigrationContext};
use moodjournal_core::db::{open_db, open_db_at_version, DbError};
use moodjournal_core::{derive_id, is_derived_id, ClientId};
use rusqlite::Connection;
use std::time::Duration;
use uuid::Uuid;

const BUSY: Duration = Duration::from_secs(5);

#[test]
fn fresh_database_applies_all_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.sqlite3");
    let conn = open_db(&path, BUSY, &MigrationContext::default()).unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "journal");
    assert_table_exists(&conn, "identity");
    assert_table_missing(&conn, "journal_scratch");
    assert_column_exists(&conn, "journal", "created_at");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.sqlite3");

    let first = open_db(&path, BUSY, &MigrationContext::default()).unwrap();
    let identity_before = client_id(&first);
    drop(first);

    let imported = MigrationContext::with_import_identity(Some(ClientId::generate()));
    let second = open_db(&path, BUSY, &imported).unwrap();
    assert_eq!(schema_version(&second).unwrap(), latest_version());
    assert_eq!(client_id(&second), identity_before);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path, BUSY, &MigrationContext::default()).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn every_older_version_upgrades_to_latest_without_losing_rows() {
    for start in 1..latest_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.sqlite3");
        let owner = ClientId::generate();
        let ctx = MigrationContext::with_import_identity(Some(owner));

        {
            let conn = open_db_at_version(&path, start, BUSY, &ctx).unwrap();
            assert_eq!(schema_version(&conn).unwrap(), start);
            insert_legacy(&conn, "2023-01-01T08:00:00.000Z", 0, "first");
            insert_legacy(&conn, "2023-01-02T08:00:00.000Z", 4, "second");
        }

        let conn = open_db(&path, BUSY, &ctx).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest_version());
        assert_eq!(client_id(&conn), owner, "start version {start}");

        let rows = journal_rows(&conn);
        assert_eq!(rows.len(), 2, "start version {start}");
        for (id, created_at, date, _text) in &rows {
            let id = Uuid::parse_str(id).unwrap();
            assert!(is_derived_id(&id));
            assert_eq!(created_at, &owner.to_string());
            let date = chrono::DateTime::parse_from_rfc3339(date)
                .unwrap()
                .with_timezone(&Utc);
            assert_eq!(id, derive_id(&date, owner));
        }
        assert_eq!(rows[0].3, "first");
        assert_eq!(rows[1].3, "second");
    }
}

#[test]
fn version_zero_file_gets_fresh_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.sqlite3");
    Connection::open(&path).unwrap();

    let conn = open_db(&path, BUSY, &MigrationContext::default()).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    let _ = client_id(&conn);
}

#[test]
fn failed_step_rolls_back_entire_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.sqlite3");
    let ctx = MigrationContext::default();

    {
        let conn = open_db_at_version(&path, 1, BUSY, &ctx).unwrap();
        insert_legacy(&conn, "not a date", 1, "bad row");
    }

    let err = open_db(&path, BUSY, &ctx).unwrap_err();
    assert!(matches!(err, DbError::InvalidData(_)), "unexpected error: {err}");

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), 1);
    assert_table_missing(&conn, "identity");
    assert_table_missing(&conn, "journal_scratch");
    assert_column_exists(&conn, "journal", "key");
}

#[test]
fn rekeyed_ids_match_dates_in_canonical_form() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offset.sqlite3");
    let owner = ClientId::generate();
    let ctx = MigrationContext::with_import_identity(Some(owner));

    {
        let conn = open_db_at_version(&path, 2, BUSY, &ctx).unwrap();
        insert_legacy(&conn, "2023-01-01T10:00:00.123456+02:00", 2, "offset");
    }

    let conn = open_db(&path, BUSY, &ctx).unwrap();
    let rows = journal_rows(&conn);
    assert_eq!(rows[0].2, "2023-01-01T08:00:00.123Z");
    let date = Utc.timestamp_millis_opt(1_672_560_000_123).unwrap();
    assert_eq!(rows[0].0, derive_id(&date, owner).to_string());
}

fn insert_legacy(conn: &Connection, date: &str, mood: i64, text: &str) {
    conn.execute(
        "INSERT INTO journal (date, mood, text) VALUES (?1, ?2, ?3);",
        rusqlite::params![date, mood, text],
    )
    .unwrap();
}

fn journal_rows(conn: &Connection) -> Vec<(String, String, String, String)> {
    let mut stmt = conn
        .prepare("SELECT id, created_at, date, text FROM journal ORDER BY rowid;")
        .unwrap();
    stmt.query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    })
    .unwrap()
    .map(Result::unwrap)
    .collect()
}

fn client_id(conn: &Connection) -> ClientId {
    let text: String = conn
        .query_row(
            "SELECT value FROM identity WHERE key = 'client_id';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    text.parse().unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert!(table_exists(conn, table_name), "table {table_name} does not exist");
}

fn assert_table_missing(conn: &Connection, table_name: &str) {
    assert!(!table_exists(conn, table_name), "table {table_name} should not exist");
}

fn table_exists(conn: &Connection, table_name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}

fn assert_column_exists(conn: &Connection, table_name: &str, column: &str) {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table_name});"))
        .unwrap();
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert!(
        columns.iter().any(|name| name == column),
        "column {column} missing from {table_name}: {columns:?}"
    );
}
