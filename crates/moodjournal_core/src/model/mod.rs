//! Domain model for mood journal entries.
//!
//! # Responsibility
//! - Define canonical data structures shared by store, codec and export.
//!
//! # Invariants
//! - Every entry is addressed by a content-derived `EntryId`.
//! - Every entry names the `ClientId` that created it.

pub mod entry;
