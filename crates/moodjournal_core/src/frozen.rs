//! Read-only shared snapshots.
//!
//! `Frozen<T>` hands out values that nobody can mutate: it derefs to `&T`
//! only, and cloning shares the same allocation. Data returned from the
//! store and held in export bundles travels in this wrapper.
//!
//! ```compile_fail
//! use moodjournal_core::Frozen;
//!
//! let frozen: Frozen<[i32]> = Frozen::from(vec![1, 2, 3]);
//! frozen.push(4);
//! ```

use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Immutable, cheaply cloneable view of `T`.
pub struct Frozen<T: ?Sized>(Arc<T>);

impl<T> Frozen<[T]> {
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl<T: Clone> Frozen<[T]> {
    /// Returns a new snapshot with `item` appended; `self` is untouched.
    pub fn with_appended(&self, item: T) -> Self {
        let mut items = self.0.to_vec();
        items.push(item);
        Self::from(items)
    }
}

impl<T: ?Sized> Clone for Frozen<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Frozen<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> From<Vec<T>> for Frozen<[T]> {
    fn from(value: Vec<T>) -> Self {
        Self(Arc::from(value))
    }
}

impl<T> FromIterator<T> for Frozen<[T]> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: ?Sized + PartialEq> PartialEq for Frozen<T> {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl<T: ?Sized + Eq> Eq for Frozen<T> {}

impl<T: ?Sized + Debug> Debug for Frozen<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
