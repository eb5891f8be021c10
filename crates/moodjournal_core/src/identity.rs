//! Client identity keyspace.
//!
//! One UUID per store, written once by the 1→2 migration step and read back
//! when a handle opens. Only an import may choose the value.

use crate::db::{DbError, DbResult};
use crate::model::entry::ClientId;
use rusqlite::{params, Connection, OptionalExtension};

/// Well-known key of the client id row in the `identity` table.
pub const CLIENT_ID_KEY: &str = "client_id";

/// Writes the client id, replacing any previous value.
pub(crate) fn write_client_id(conn: &Connection, id: ClientId) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO identity (key, value) VALUES (?1, ?2);",
        params![CLIENT_ID_KEY, id.to_string()],
    )?;
    Ok(())
}

/// Reads the client id, or `None` when the row is absent.
pub(crate) fn read_client_id(conn: &Connection) -> DbResult<Option<ClientId>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM identity WHERE key = ?1;",
            [CLIENT_ID_KEY],
            |row| row.get(0),
        )
        .optional()?;

    value
        .map(|text| {
            text.parse::<ClientId>().map_err(|_| {
                DbError::InvalidData(format!("invalid client id `{text}` in identity.value"))
            })
        })
        .transpose()
}

/// Reads the client id, failing when the store has none.
pub(crate) fn resolve_client_id(conn: &Connection) -> DbResult<ClientId> {
    read_client_id(conn)?.ok_or(DbError::MissingIdentity)
}

#[cfg(test)]
mod tests {
    use super::{read_client_id, resolve_client_id, write_client_id};
    use crate::db::DbError;
    use crate::model::entry::ClientId;
    use rusqlite::Connection;

    fn identity_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("db/migrations/0002_identity.sql"))
            .unwrap();
        conn
    }

    #[test]
    fn empty_keyspace_reads_none() {
        let conn = identity_conn();
        assert!(read_client_id(&conn).unwrap().is_none());
        assert!(matches!(
            resolve_client_id(&conn),
            Err(DbError::MissingIdentity)
        ));
    }

    #[test]
    fn written_id_reads_back() {
        let conn = identity_conn();
        let id = ClientId::generate();
        write_client_id(&conn, id).unwrap();
        assert_eq!(resolve_client_id(&conn).unwrap(), id);
    }

    #[test]
    fn garbage_value_is_rejected() {
        let conn = identity_conn();
        conn.execute(
            "INSERT INTO identity (key, value) VALUES ('client_id', 'nope');",
            [],
        )
        .unwrap();
        assert!(matches!(
            read_client_id(&conn),
            Err(DbError::InvalidData(_))
        ));
    }
}
