//! Portable store snapshots.
//!
//! # Responsibility
//! - Hold an immutable `{ client_id, version, journal }` snapshot.
//! - Read and write the JSON document exchanged between clients.
//!
//! # Invariants
//! - A bundle never aliases live store data.
//! - A bundle's version is within `1..=latest_version()`.
//! - Bundles at the latest version carry derived ids and an owner for
//!   every entry; older bundles may carry legacy numeric keys.
//!
//! # JSON shape
//! ```text
//! { "data": { "id": "<client uuid>", "version": 3,
//!             "journal": [ { "date": "<ISO8601>", "content": { "mood": 0, "text": "" },
//!                            "id": "<uuid>" | <number>, "created_at": "<client uuid>" } ] } }
//! ```

use crate::codec;
use crate::db::migrations::latest_version;
use crate::frozen::Frozen;
use crate::model::entry::{truncate_to_millis, ClientId, Entry, EntryContent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum BundleError {
    Json(serde_json::Error),
    UnsupportedVersion { version: u32, latest_supported: u32 },
    InvalidEntry(String),
}

impl Display for BundleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "malformed export document: {err}"),
            Self::UnsupportedVersion {
                version,
                latest_supported,
            } => write!(
                f,
                "export version {version} is not importable (supported 1..={latest_supported})"
            ),
            Self::InvalidEntry(message) => write!(f, "invalid export entry: {message}"),
        }
    }
}

impl Error for BundleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::UnsupportedVersion { .. } | Self::InvalidEntry(_) => None,
        }
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Entry key as written by the exporting schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryKey {
    /// Auto-increment key from schemas before derived ids.
    Legacy(u64),
    Derived(Uuid),
}

/// One exported journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(with = "codec::iso8601_serde")]
    date: DateTime<Utc>,
    content: EntryContent,
    id: EntryKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<ClientId>,
}

impl BundleEntry {
    /// Builds an entry in the numeric-key shape of older exports.
    pub fn legacy(key: u64, date: DateTime<Utc>, content: EntryContent) -> Self {
        Self {
            date: truncate_to_millis(date),
            content,
            id: EntryKey::Legacy(key),
            created_at: None,
        }
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn content(&self) -> &EntryContent {
        &self.content
    }

    pub fn id(&self) -> EntryKey {
        self.id
    }

    pub fn created_at(&self) -> Option<ClientId> {
        self.created_at
    }
}

impl From<&Entry> for BundleEntry {
    fn from(entry: &Entry) -> Self {
        Self {
            date: entry.date(),
            content: entry.content().clone(),
            id: EntryKey::Derived(entry.id()),
            created_at: Some(entry.created_at()),
        }
    }
}

/// Immutable snapshot of one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBundle {
    client_id: ClientId,
    version: u32,
    journal: Frozen<[BundleEntry]>,
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    data: DataOut<'a>,
}

#[derive(Serialize)]
struct DataOut<'a> {
    id: ClientId,
    version: u32,
    journal: &'a [BundleEntry],
}

#[derive(Deserialize)]
struct DocumentIn {
    data: DataIn,
}

#[derive(Deserialize)]
struct DataIn {
    id: ClientId,
    version: u32,
    journal: Vec<BundleEntry>,
}

impl ExportBundle {
    /// Builds a bundle after checking the version/entry invariants.
    pub fn new(
        client_id: ClientId,
        version: u32,
        journal: Vec<BundleEntry>,
    ) -> Result<Self, BundleError> {
        validate(client_id, version, &journal)?;
        Ok(Self {
            client_id,
            version,
            journal: Frozen::from(journal),
        })
    }

    /// Snapshots stored entries at the latest schema.
    pub(crate) fn from_entries(client_id: ClientId, entries: &[Entry]) -> Self {
        Self {
            client_id,
            version: latest_version(),
            journal: entries.iter().map(BundleEntry::from).collect(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn journal(&self) -> &[BundleEntry] {
        &self.journal
    }

    pub fn record_count(&self) -> usize {
        self.journal.len()
    }

    pub fn to_json(&self) -> Result<String, BundleError> {
        let document = DocumentOut {
            data: DataOut {
                id: self.client_id,
                version: self.version,
                journal: &self.journal,
            },
        };
        Ok(serde_json::to_string(&document)?)
    }

    pub fn from_json(text: &str) -> Result<Self, BundleError> {
        let document: DocumentIn = serde_json::from_str(text)?;
        Self::new(
            document.data.id,
            document.data.version,
            document.data.journal,
        )
    }
}

fn validate(
    client_id: ClientId,
    version: u32,
    journal: &[BundleEntry],
) -> Result<(), BundleError> {
    let latest = latest_version();
    if version == 0 || version > latest {
        return Err(BundleError::UnsupportedVersion {
            version,
            latest_supported: latest,
        });
    }

    // Import stores every entry under the id derived from its date and
    // owner; two entries landing on one id would lose a record.
    let mut seen = HashSet::with_capacity(journal.len());
    for (index, entry) in journal.iter().enumerate() {
        if !codec::has_canonical_form(&entry.date) {
            return Err(BundleError::InvalidEntry(format!(
                "entry {index} has a date outside the storable years"
            )));
        }
        let owner = entry.created_at.unwrap_or(client_id);
        if !seen.insert(codec::derive_id(&entry.date, owner)) {
            return Err(BundleError::InvalidEntry(format!(
                "entry {index} repeats the date {} of an earlier entry",
                codec::iso8601(&entry.date)
            )));
        }
    }
    if version < latest {
        return Ok(());
    }

    for (index, entry) in journal.iter().enumerate() {
        if !matches!(entry.id, EntryKey::Derived(_)) {
            return Err(BundleError::InvalidEntry(format!(
                "entry {index} has a legacy id in a version {version} export"
            )));
        }
        if entry.created_at.is_none() {
            return Err(BundleError::InvalidEntry(format!(
                "entry {index} has no created_at in a version {version} export"
            )));
        }
    }
    Ok(())
}
