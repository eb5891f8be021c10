//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migration steps in strictly increasing order.
//! - Apply the pending suffix of steps atomically in one exclusive
//!   transaction.
//!
//! # Invariants
//! - `version` values are contiguous from 1 and never reordered.
//! - A step at version `v` upgrades layout `v - 1` to layout `v`; starting at
//!   `v` always runs every later step up to the target.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A failing step rolls back the whole upgrade, version included.

use crate::codec;
use crate::db::{DbError, DbResult};
use crate::identity;
use crate::model::entry::{truncate_to_millis, ClientId, Mood};
use log::{debug, info, warn};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::HashSet;

/// Inputs a migration step may need besides the database itself.
#[derive(Debug, Clone, Default)]
pub struct MigrationContext {
    /// Identity adopted by the identity step instead of generating one.
    pub import_identity: Option<ClientId>,
}

impl MigrationContext {
    pub fn with_import_identity(identity: Option<ClientId>) -> Self {
        Self {
            import_identity: identity,
        }
    }
}

type MigrationStep = fn(&Transaction<'_>, &MigrationContext) -> DbResult<()>;

#[derive(Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    apply: MigrationStep,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_journal",
        apply: create_journal,
    },
    Migration {
        version: 2,
        name: "create_identity",
        apply: create_identity,
    },
    Migration {
        version: 3,
        name: "rekey_journal",
        apply: rekey_journal,
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Reads the schema version stored in the database.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Applies all pending migrations on the provided connection.
///
/// Returns the schema version after the call.
pub fn apply_migrations(conn: &mut Connection, ctx: &MigrationContext) -> DbResult<u32> {
    apply_migrations_to(conn, latest_version(), ctx)
}

/// Applies pending migrations up to and including `target`.
///
/// Older targets exist for import seeding, which must write rows in the
/// layout of the version they were exported from.
pub fn apply_migrations_to(
    conn: &mut Connection,
    target: u32,
    ctx: &MigrationContext,
) -> DbResult<u32> {
    let latest = latest_version();
    if target > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: target,
            latest_supported: latest,
        });
    }

    let observed = schema_version(conn)?;
    check_supported(observed, latest)?;
    if observed >= target {
        return Ok(observed);
    }

    // Another connection may have migrated between the read above and the
    // exclusive lock; the version read inside the transaction is the one
    // that counts.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
    let current = schema_version(&tx)?;
    check_supported(current, latest)?;
    if current >= target {
        return Ok(current);
    }

    info!(
        "event=migration_apply module=db status=start from={} to={}",
        current, target
    );
    for migration in pending(current, target) {
        debug!(
            "event=migration_step module=db status=start version={} name={}",
            migration.version, migration.name
        );
        if let Err(err) = (migration.apply)(&tx, ctx) {
            warn!(
                "event=migration_step module=db status=error version={} name={} error={}",
                migration.version, migration.name, err
            );
            return Err(err);
        }
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;
    info!(
        "event=migration_apply module=db status=ok from={} to={}",
        current, target
    );

    Ok(target)
}

fn pending(current: u32, target: u32) -> impl Iterator<Item = &'static Migration> {
    MIGRATIONS
        .iter()
        .skip_while(move |migration| migration.version <= current)
        .take_while(move |migration| migration.version <= target)
}

fn check_supported(version: u32, latest: u32) -> DbResult<()> {
    if version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: version,
            latest_supported: latest,
        });
    }
    Ok(())
}

fn create_journal(tx: &Transaction<'_>, _ctx: &MigrationContext) -> DbResult<()> {
    tx.execute_batch(include_str!("0001_journal.sql"))?;
    Ok(())
}

fn create_identity(tx: &Transaction<'_>, ctx: &MigrationContext) -> DbResult<()> {
    tx.execute_batch(include_str!("0002_identity.sql"))?;
    let client_id = ctx.import_identity.unwrap_or_else(ClientId::generate);
    identity::write_client_id(tx, client_id)?;
    info!(
        "event=identity_create module=db status=ok imported={}",
        ctx.import_identity.is_some()
    );
    Ok(())
}

/// Moves legacy rows from numeric keys to derived ids.
///
/// Key layout cannot change in place, so rows are staged in
/// `journal_scratch` before `journal` is recreated.
fn rekey_journal(tx: &Transaction<'_>, _ctx: &MigrationContext) -> DbResult<()> {
    let owner = identity::resolve_client_id(tx)?;
    tx.execute_batch(include_str!("0003_scratch.sql"))?;

    let mut seen = HashSet::new();
    let mut moved = 0_usize;
    {
        let mut select = tx.prepare("SELECT key, date, mood, text FROM journal ORDER BY key;")?;
        let mut insert = tx.prepare(
            "INSERT OR REPLACE INTO journal_scratch (id, created_at, date, mood, text)
             VALUES (?1, ?2, ?3, ?4, ?5);",
        )?;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let key: i64 = row.get(0)?;
            let date_text: String = row.get(1)?;
            let date = codec::parse_iso8601(&date_text).map_err(|err| {
                DbError::InvalidData(format!(
                    "invalid date `{date_text}` in journal row {key}: {err}"
                ))
            })?;
            let date = truncate_to_millis(date);
            let mood_level: i64 = row.get(2)?;
            let mood = Mood::try_from(mood_level)
                .map_err(|err| DbError::InvalidData(format!("journal row {key}: {err}")))?;
            let text: String = row.get(3)?;

            let id = codec::derive_id(&date, owner);
            if !seen.insert(id) {
                warn!(
                    "event=migration_step module=db status=collision version=3 legacy_key={}",
                    key
                );
            }
            insert.execute(params![
                id.to_string(),
                owner.to_string(),
                codec::iso8601(&date),
                mood.level(),
                text,
            ])?;
            moved += 1;
        }
    }

    tx.execute_batch(include_str!("0003_swap.sql"))?;
    debug!(
        "event=migration_step module=db status=ok version=3 rows={} distinct_ids={}",
        moved,
        seen.len()
    );
    Ok(())
}
