//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from the store facade.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`DuplicateEntry`,
//!   `InvalidData`) in addition to DB transport errors.

pub mod journal_repo;
