//! Journal entry domain model.
//!
//! # Responsibility
//! - Define the canonical journal record and its mood/text payload.
//! - Define the identity types that own and address records.
//!
//! # Invariants
//! - `Entry::id` always equals `codec::derive_id(date, created_at)`.
//! - `Entry` dates carry millisecond precision; finer parts are dropped on
//!   construction so stored and returned values compare equal.
//! - `Entry` exposes no mutators; callers only ever see stored state.
//!
//! # See also
//! - crate::codec

use crate::codec;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of a journal entry (UUID v5 derived by the codec).
pub type EntryId = Uuid;

/// Five ordered mood levels, serialized as integers `0..=4`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Mood {
    VeryBad,
    Bad,
    #[default]
    Neutral,
    Good,
    VeryGood,
}

impl Mood {
    /// All levels from worst to best.
    pub const ALL: [Mood; 5] = [
        Mood::VeryBad,
        Mood::Bad,
        Mood::Neutral,
        Mood::Good,
        Mood::VeryGood,
    ];

    /// Numeric level as persisted and exported.
    pub fn level(self) -> u8 {
        match self {
            Self::VeryBad => 0,
            Self::Bad => 1,
            Self::Neutral => 2,
            Self::Good => 3,
            Self::VeryGood => 4,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::VeryBad => "Very Bad",
            Self::Bad => "Bad",
            Self::Neutral => "Neutral",
            Self::Good => "Good",
            Self::VeryGood => "Very Good",
        }
    }
}

/// Rejected numeric mood level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMood(pub i64);

impl Display for InvalidMood {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "mood level {} is out of range 0..=4", self.0)
    }
}

impl Error for InvalidMood {}

impl TryFrom<u8> for Mood {
    type Error = InvalidMood;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl TryFrom<i64> for Mood {
    type Error = InvalidMood;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::VeryBad),
            1 => Ok(Self::Bad),
            2 => Ok(Self::Neutral),
            3 => Ok(Self::Good),
            4 => Ok(Self::VeryGood),
            other => Err(InvalidMood(other)),
        }
    }
}

impl From<Mood> for u8 {
    fn from(value: Mood) -> Self {
        value.level()
    }
}

/// Payload written by the user for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryContent {
    pub mood: Mood,
    pub text: String,
}

impl EntryContent {
    pub fn new(mood: Mood, text: impl Into<String>) -> Self {
        Self {
            mood,
            text: text.into(),
        }
    }
}

/// UUID naming the client (store instance) that owns created entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// Persisted journal entry.
///
/// Fields are private: an `Entry` can be read and cloned, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    id: EntryId,
    created_at: ClientId,
    #[serde(with = "codec::iso8601_serde")]
    date: DateTime<Utc>,
    content: EntryContent,
}

impl Entry {
    /// Builds an entry owned by `owner`, deriving its id from `date`.
    pub fn new(date: DateTime<Utc>, content: EntryContent, owner: ClientId) -> Self {
        let date = truncate_to_millis(date);
        Self {
            id: codec::derive_id(&date, owner),
            created_at: owner,
            date,
            content,
        }
    }

    /// Rebuilds an entry from persisted columns.
    ///
    /// Returns `None` when `id` does not match the id derived from
    /// `(date, created_at)`.
    pub(crate) fn from_stored(
        id: EntryId,
        created_at: ClientId,
        date: DateTime<Utc>,
        content: EntryContent,
    ) -> Option<Self> {
        let entry = Self::new(date, content, created_at);
        (entry.id == id).then_some(entry)
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Identity of the client that created this entry.
    pub fn created_at(&self) -> ClientId {
        self.created_at
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn content(&self) -> &EntryContent {
        &self.content
    }

    pub fn mood(&self) -> Mood {
        self.content.mood
    }

    pub fn text(&self) -> &str {
        &self.content.text
    }
}

/// Drops sub-millisecond precision.
pub fn truncate_to_millis(date: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = date.nanosecond();
    date.with_nanosecond(nanos - nanos % 1_000_000)
        .unwrap_or(date)
}
