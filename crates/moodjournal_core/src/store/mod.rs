//! Journal store facade.
//!
//! # Responsibility
//! - Open a named store through the shared [`OpenLock`], migrating it and
//!   resolving its client identity in the background.
//! - Expose add / retrieve / clear / export / close over that store.
//! - Keep an in-memory mirror of the stored entry list for readers that
//!   must not wait on I/O. The mirror is loaded when the open settles and
//!   follows every write made through this handle.
//!
//! # Invariants
//! - Every operation after [`Store::close`] fails with `Closed`.
//! - Entries handed out are [`Frozen`] snapshots; nothing returned aliases
//!   the connection or can be edited.
//! - A failed open poisons only this handle.
//!
//! # Runtime
//! - Handles run on tokio. SQLite calls execute on the blocking pool; one
//!   handle's calls are serialized on its connection.

mod error;
mod import;

pub use error::{StoreError, StoreResult};
pub use import::import_store_name;

use crate::config::StoreConfig;
use crate::db::migrations::{latest_version, MigrationContext};
use crate::db::{open_db, OpenLock, OpenTicket};
use crate::export::{BundleEntry, ExportBundle};
use crate::frozen::Frozen;
use crate::identity;
use crate::model::entry::{ClientId, Entry, EntryContent, EntryId};
use crate::repo::journal_repo::{JournalRepository, RepoError, RepoResult, SqliteJournalRepository};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Store name used when none is given.
pub const DEFAULT_STORE_NAME: &str = "journal";

/// Construction parameters for a [`Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    name: String,
    import_identity: Option<ClientId>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::named(DEFAULT_STORE_NAME)
    }
}

impl StoreOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            import_identity: None,
        }
    }

    /// Identity adopted instead of a generated one if this open creates the
    /// identity keyspace.
    pub fn with_import_identity(mut self, identity: ClientId) -> Self {
        self.import_identity = Some(identity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn import_identity(&self) -> Option<ClientId> {
        self.import_identity
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready(ClientId),
    Failed(String),
    Closed,
}

impl Readiness {
    fn to_result(&self) -> StoreResult<ClientId> {
        match self {
            Self::Pending => Err(StoreError::NotReady),
            Self::Ready(identity) => Ok(*identity),
            Self::Failed(message) => Err(StoreError::OpenFailed(message.clone())),
            Self::Closed => Err(StoreError::Closed),
        }
    }
}

enum Slot {
    Opening,
    Open(Connection),
    Failed(String),
    Closed,
}

struct Shared {
    name: String,
    slot: Mutex<Slot>,
    readiness: watch::Sender<Readiness>,
    mirror: RwLock<Frozen<[Entry]>>,
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mirror(&self) -> Frozen<[Entry]> {
        self.mirror
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_mirror(&self, update: impl FnOnce(&Frozen<[Entry]>) -> Frozen<[Entry]>) {
        let mut mirror = self.mirror.write().unwrap_or_else(PoisonError::into_inner);
        *mirror = update(&mirror);
    }

    fn settle_open(&self, outcome: Result<Opened, String>) {
        let mut slot = self.lock_slot();
        if matches!(*slot, Slot::Closed) {
            // Closed while opening: the connection is dropped here.
            return;
        }
        match outcome {
            Ok(opened) => {
                *slot = Slot::Open(opened.conn);
                self.update_mirror(|_| opened.entries);
                self.readiness.send_replace(Readiness::Ready(opened.identity));
            }
            Err(message) => {
                *slot = Slot::Failed(message.clone());
                self.readiness.send_replace(Readiness::Failed(message));
            }
        }
    }
}

struct Opened {
    conn: Connection,
    identity: ClientId,
    /// Stored entries at open time; seeds the mirror.
    entries: Frozen<[Entry]>,
}

struct OpenRequest {
    path: Result<PathBuf, String>,
    busy_timeout: Duration,
    ctx: MigrationContext,
}

/// Handle on one named journal store.
pub struct Store {
    shared: Arc<Shared>,
}

impl Store {
    /// Creates a handle and starts opening the store in the background.
    ///
    /// The open ticket is taken before this returns, so handles are
    /// admitted in construction order. Await [`Store::ready`] (or any
    /// operation) to observe the outcome. Without a running tokio runtime
    /// the handle settles as `OpenFailed`.
    pub fn new(config: &StoreConfig, lock: &OpenLock, options: StoreOptions) -> Self {
        let (readiness, _) = watch::channel(Readiness::Pending);
        let shared = Arc::new(Shared {
            name: options.name.clone(),
            slot: Mutex::new(Slot::Opening),
            readiness,
            mirror: RwLock::new(Frozen::empty()),
        });

        let request = OpenRequest {
            path: config
                .db_path(&options.name)
                .map_err(|err| err.to_string()),
            busy_timeout: config.busy_timeout(),
            ctx: MigrationContext::with_import_identity(options.import_identity),
        };
        let ticket = lock.enqueue();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(open_task(Arc::clone(&shared), ticket, request));
            }
            Err(err) => {
                drop(ticket);
                shared.settle_open(Err(format!("no tokio runtime available: {err}")));
            }
        }

        Self { shared }
    }

    /// Creates a handle and waits until it is usable.
    pub async fn open(
        config: &StoreConfig,
        lock: &OpenLock,
        options: StoreOptions,
    ) -> StoreResult<Self> {
        let store = Self::new(config, lock, options);
        store.ready().await?;
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Schema version every opened handle runs at.
    pub fn version(&self) -> u32 {
        latest_version()
    }

    /// Waits for the open to settle and returns the client identity.
    pub async fn ready(&self) -> StoreResult<ClientId> {
        let mut readiness = self.shared.readiness.subscribe();
        let settled = readiness
            .wait_for(|state| *state != Readiness::Pending)
            .await
            .map_err(|_| StoreError::Closed)?;
        settled.to_result()
    }

    /// Returns the client identity without waiting.
    ///
    /// Fails with `NotReady` while the open is still in flight.
    pub fn identity(&self) -> StoreResult<ClientId> {
        self.shared.readiness.borrow().to_result()
    }

    /// Last entry list observed by this handle, without touching storage.
    pub fn entries(&self) -> Frozen<[Entry]> {
        self.shared.mirror()
    }

    /// Stores a new entry owned by this store's identity.
    pub async fn add(&self, date: DateTime<Utc>, content: EntryContent) -> StoreResult<EntryId> {
        let owner = self.ready().await?;
        self.insert(Entry::new(date, content, owner)).await
    }

    /// Stores an exported entry, keeping its original owner.
    pub(crate) async fn add_exported(&self, exported: &BundleEntry) -> StoreResult<EntryId> {
        let identity = self.ready().await?;
        let owner = exported.created_at().unwrap_or(identity);
        self.insert(Entry::new(
            exported.date(),
            exported.content().clone(),
            owner,
        ))
        .await
    }

    async fn insert(&self, entry: Entry) -> StoreResult<EntryId> {
        let started_at = Instant::now();
        let stored = entry.clone();
        let result = self
            .run(StoreError::WriteFailed, move |conn| {
                SqliteJournalRepository::try_new(conn)?.insert_entry(&stored)
            })
            .await;

        match result {
            Ok(id) => {
                self.shared
                    .update_mirror(|current| current.with_appended(entry));
                info!(
                    "event=entry_add module=store status=ok store={} duration_ms={}",
                    self.shared.name,
                    started_at.elapsed().as_millis()
                );
                Ok(id)
            }
            Err(err) => {
                error!(
                    "event=entry_add module=store status=error store={} error={}",
                    self.shared.name, err
                );
                Err(err)
            }
        }
    }

    /// Reads every stored entry.
    pub async fn retrieve_all(&self) -> StoreResult<Frozen<[Entry]>> {
        let started_at = Instant::now();
        let result = self
            .run(StoreError::ReadFailed, |conn| {
                SqliteJournalRepository::try_new(conn)?.list_entries()
            })
            .await;

        match result {
            Ok(entries) => {
                let entries = Frozen::from(entries);
                self.shared.update_mirror(|_| entries.clone());
                info!(
                    "event=entries_read module=store status=ok store={} count={} duration_ms={}",
                    self.shared.name,
                    entries.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(entries)
            }
            Err(err) => {
                error!(
                    "event=entries_read module=store status=error store={} error={}",
                    self.shared.name, err
                );
                Err(err)
            }
        }
    }

    /// Deletes every entry. The client identity is kept.
    pub async fn clear(&self) -> StoreResult<()> {
        let removed = self
            .run(StoreError::WriteFailed, |conn| {
                SqliteJournalRepository::try_new(conn)?.clear_entries()
            })
            .await?;
        self.shared.update_mirror(|_| Frozen::empty());
        info!(
            "event=entries_clear module=store status=ok store={} removed={}",
            self.shared.name, removed
        );
        Ok(())
    }

    /// Snapshots identity, version and every entry.
    pub async fn export(&self) -> StoreResult<ExportBundle> {
        let identity = self.ready().await?;
        let entries = self.retrieve_all().await?;
        info!(
            "event=store_export module=store status=ok store={} count={}",
            self.shared.name,
            entries.len()
        );
        Ok(ExportBundle::from_entries(identity, &entries))
    }

    /// Releases the connection. Idempotent.
    ///
    /// Waits for an operation of this handle that is already running on the
    /// blocking pool, so the calling thread can stall for the length of one
    /// SQLite statement. Operations started afterwards fail with `Closed`.
    pub fn close(&self) {
        let previous = {
            let mut slot = self.shared.lock_slot();
            std::mem::replace(&mut *slot, Slot::Closed)
        };
        self.shared.readiness.send_replace(Readiness::Closed);
        self.shared.update_mirror(|_| Frozen::empty());
        if matches!(previous, Slot::Open(_)) {
            info!(
                "event=store_close module=store status=ok store={}",
                self.shared.name
            );
        }
    }

    /// Runs `op` against the open connection on the blocking pool.
    async fn run<T, F>(&self, failure: fn(RepoError) -> StoreError, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> RepoResult<T> + Send + 'static,
    {
        self.ready().await?;
        let shared = Arc::clone(&self.shared);
        let joined = tokio::task::spawn_blocking(move || {
            let slot = shared.lock_slot();
            match &*slot {
                Slot::Open(conn) => Ok(op(conn)),
                Slot::Opening => Err(StoreError::NotReady),
                Slot::Failed(message) => Err(StoreError::OpenFailed(message.clone())),
                Slot::Closed => Err(StoreError::Closed),
            }
        })
        .await;

        match joined {
            Ok(Ok(result)) => result.map_err(failure),
            Ok(Err(err)) => Err(err),
            Err(err) => Err(failure(RepoError::Aborted(err.to_string()))),
        }
    }
}

async fn open_task(shared: Arc<Shared>, ticket: OpenTicket, request: OpenRequest) {
    ticket.admitted().await;
    let started_at = Instant::now();
    info!(
        "event=store_open module=store status=start store={} ticket={}",
        shared.name,
        ticket.id()
    );

    let outcome = match request.path {
        Ok(path) => {
            let busy_timeout = request.busy_timeout;
            let ctx = request.ctx;
            match tokio::task::spawn_blocking(move || open_and_resolve(&path, busy_timeout, &ctx))
                .await
            {
                Ok(Ok(opened)) => Ok(opened),
                Ok(Err(err)) => Err(err.to_string()),
                Err(err) => Err(format!("open task aborted: {err}")),
            }
        }
        Err(message) => Err(message),
    };
    drop(ticket);

    match &outcome {
        Ok(opened) => info!(
            "event=store_open module=store status=ok store={} client_id={} count={} duration_ms={}",
            shared.name,
            opened.identity,
            opened.entries.len(),
            started_at.elapsed().as_millis()
        ),
        Err(message) => error!(
            "event=store_open module=store status=error store={} duration_ms={} error={}",
            shared.name,
            started_at.elapsed().as_millis(),
            message
        ),
    }
    if matches!(*shared.lock_slot(), Slot::Closed) {
        warn!(
            "event=store_open module=store status=discarded store={} reason=closed_while_opening",
            shared.name
        );
    }
    shared.settle_open(outcome);
}

fn open_and_resolve(
    path: &std::path::Path,
    busy_timeout: Duration,
    ctx: &MigrationContext,
) -> RepoResult<Opened> {
    let conn = open_db(path, busy_timeout, ctx)?;
    let identity = identity::resolve_client_id(&conn)?;
    let entries = SqliteJournalRepository::try_new(&conn)?.list_entries()?;
    Ok(Opened {
        conn,
        identity,
        entries: Frozen::from(entries),
    })
}
