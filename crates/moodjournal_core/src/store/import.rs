//! Construction of a store from an export bundle.

use super::{Store, StoreError, StoreOptions, StoreResult};
use crate::config::StoreConfig;
use crate::db::migrations::{latest_version, MigrationContext};
use crate::db::{open_db_at_version, DbError, OpenLock};
use crate::export::{BundleEntry, ExportBundle};
use crate::model::entry::ClientId;
use crate::repo::journal_repo::{insert_legacy_entry, RepoResult};
use log::{error, info};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Name of the store that receives imports for `client_id`.
pub fn import_store_name(client_id: ClientId) -> String {
    format!("import_for_{client_id}")
}

struct SeedPlan {
    files: Vec<PathBuf>,
    version: u32,
    identity: ClientId,
    busy_timeout: Duration,
    legacy_entries: Vec<BundleEntry>,
}

impl Store {
    /// Builds a fresh store holding the bundle's identity and entries.
    ///
    /// The target store is `import_for_<client_id>`; whatever it held
    /// before is discarded. Bundles from older schemas are written in
    /// their own layout first and carried forward by the regular
    /// migration chain when the store opens.
    pub async fn from_export(
        config: &StoreConfig,
        lock: &OpenLock,
        bundle: &ExportBundle,
    ) -> StoreResult<Store> {
        let started_at = Instant::now();
        let name = import_store_name(bundle.client_id());
        info!(
            "event=store_import module=store status=start store={} version={} count={}",
            name,
            bundle.version(),
            bundle.record_count()
        );

        let result = import_into(config, lock, bundle, &name).await;
        match &result {
            Ok(_) => info!(
                "event=store_import module=store status=ok store={} duration_ms={}",
                name,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=store_import module=store status=error store={} error={}",
                name, err
            ),
        }
        result
    }
}

async fn import_into(
    config: &StoreConfig,
    lock: &OpenLock,
    bundle: &ExportBundle,
    name: &str,
) -> StoreResult<Store> {
    let legacy = bundle.version() < latest_version();
    let plan = SeedPlan {
        files: config
            .db_files(name)
            .map_err(|err| StoreError::ImportFailed(err.to_string()))?,
        version: bundle.version(),
        identity: bundle.client_id(),
        busy_timeout: config.busy_timeout(),
        legacy_entries: if legacy {
            bundle.journal().to_vec()
        } else {
            Vec::new()
        },
    };

    // Seeding rewrites the database files, so it takes a turn in the open
    // queue like any other open.
    let ticket = lock.enqueue();
    ticket.admitted().await;
    let seeded = tokio::task::spawn_blocking(move || seed_target(plan)).await;
    drop(ticket);
    match seeded {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => return Err(StoreError::ImportFailed(err.to_string())),
        Err(err) => return Err(StoreError::ImportFailed(format!("seed task aborted: {err}"))),
    }

    let options = StoreOptions::named(name).with_import_identity(bundle.client_id());
    let store = Store::new(config, lock, options);
    store
        .ready()
        .await
        .map_err(|err| StoreError::ImportFailed(err.to_string()))?;

    if !legacy {
        for entry in bundle.journal() {
            store
                .add_exported(entry)
                .await
                .map_err(|err| StoreError::ImportFailed(err.to_string()))?;
        }
    }

    store
        .retrieve_all()
        .await
        .map_err(|err| StoreError::ImportFailed(err.to_string()))?;
    Ok(store)
}

/// Discards the old target and, for older bundles, writes their rows in
/// the bundle's own schema layout.
fn seed_target(plan: SeedPlan) -> RepoResult<usize> {
    for file in &plan.files {
        match std::fs::remove_file(file) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(DbError::Io(err).into()),
        }
    }

    if plan.version >= latest_version() {
        return Ok(0);
    }

    let Some(path) = plan.files.first() else {
        return Ok(0);
    };
    let ctx = MigrationContext::with_import_identity(Some(plan.identity));
    let mut conn = open_db_at_version(path, plan.version, plan.busy_timeout, &ctx)?;
    let tx = conn.transaction()?;
    for entry in &plan.legacy_entries {
        insert_legacy_entry(&tx, &entry.date(), entry.content())?;
    }
    tx.commit()?;
    Ok(plan.legacy_entries.len())
}
