//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open the database file backing one store name.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have migrations applied up to the requested
//!   version.
//! - Callers serialize these calls through `OpenLock`; nothing here waits
//!   on other opens beyond SQLite's busy timeout.

use super::migrations::{apply_migrations_to, latest_version, MigrationContext};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a store database and applies all pending migrations.
///
/// # Side effects
/// - Creates the parent directory when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(
    path: impl AsRef<Path>,
    busy_timeout: Duration,
    ctx: &MigrationContext,
) -> DbResult<Connection> {
    open_db_at_version(path, latest_version(), busy_timeout, ctx)
}

/// Opens a store database and migrates it no further than `target`.
///
/// Used by import seeding to write rows in an older layout before the
/// normal open carries them forward.
pub fn open_db_at_version(
    path: impl AsRef<Path>,
    target: u32,
    busy_timeout: Duration,
    ctx: &MigrationContext,
) -> DbResult<Connection> {
    let path = path.as_ref();
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start target_version={}",
        target
    );

    let mut conn = match connect(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
    };

    match bootstrap_connection(&mut conn, target, busy_timeout, ctx) {
        Ok(version) => {
            info!(
                "event=db_open module=db status=ok version={} duration_ms={}",
                version,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn connect(path: &Path) -> DbResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Connection::open(path)?)
}

fn bootstrap_connection(
    conn: &mut Connection,
    target: u32,
    busy_timeout: Duration,
    ctx: &MigrationContext,
) -> DbResult<u32> {
    conn.busy_timeout(busy_timeout)?;
    apply_migrations_to(conn, target, ctx)
}
