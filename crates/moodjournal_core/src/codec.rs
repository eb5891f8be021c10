//! Deterministic entry identifiers and canonical date text.
//!
//! # Responsibility
//! - Derive entry ids from `(date, owning identity)` without randomness.
//! - Own the canonical ISO8601 rendering used for ids, storage and export.
//!
//! # Invariants
//! - `derive_id` is pure: equal inputs always give equal ids.
//! - Canonical dates are UTC with exactly three fractional digits and a `Z`
//!   suffix, e.g. `2024-05-01T09:30:00.250Z`.
//! - Only years in [`CANONICAL_YEARS`] have a canonical form; anything
//!   outside must be rejected before it is persisted.

use crate::model::entry::{truncate_to_millis, ClientId, EntryId};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use std::ops::RangeInclusive;
use uuid::{Uuid, Version};

/// Years that render with four digits and parse back as RFC3339.
pub const CANONICAL_YEARS: RangeInclusive<i32> = 0..=9999;

/// Derives the id of an entry as a UUID v5 of its canonical date, namespaced
/// by the owning client identity.
pub fn derive_id(date: &DateTime<Utc>, owner: ClientId) -> EntryId {
    Uuid::new_v5(owner.as_uuid(), iso8601(date).as_bytes())
}

/// Returns whether `id` has the shape produced by [`derive_id`].
pub fn is_derived_id(id: &Uuid) -> bool {
    id.get_version() == Some(Version::Sha1)
}

/// Returns whether `date` can be written and read back in canonical form.
pub fn has_canonical_form(date: &DateTime<Utc>) -> bool {
    CANONICAL_YEARS.contains(&date.year())
}

/// Canonical ISO8601 text for a date.
pub fn iso8601(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses ISO8601/RFC3339 text into a UTC date.
pub fn parse_iso8601(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|date| date.with_timezone(&Utc))
}

/// Serde adapter writing dates as canonical ISO8601 strings.
///
/// Reading drops sub-millisecond digits so a decoded date always equals its
/// re-encoded form.
pub mod iso8601_serde {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::iso8601(date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::parse_iso8601(&text)
            .map(super::truncate_to_millis)
            .map_err(|err| de::Error::custom(format!("invalid ISO8601 date `{text}`: {err}")))
    }
}
