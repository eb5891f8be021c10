use crate::export::BundleError;
use crate::repo::journal_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a store operation.
#[derive(Debug)]
pub enum StoreError {
    /// The engine refused to open or upgrade the store.
    OpenFailed(String),
    /// Identity or connection was requested before the open settled.
    NotReady,
    WriteFailed(RepoError),
    ReadFailed(RepoError),
    /// The handle was closed explicitly.
    Closed,
    /// The bundle was malformed or re-seeding failed partway.
    ImportFailed(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenFailed(message) => write!(f, "could not open store: {message}"),
            Self::NotReady => write!(f, "store identity is not resolved yet"),
            Self::WriteFailed(err) => write!(f, "write failed: {err}"),
            Self::ReadFailed(err) => write!(f, "read failed: {err}"),
            Self::Closed => write!(f, "store is closed"),
            Self::ImportFailed(message) => write!(f, "import failed: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::WriteFailed(err) | Self::ReadFailed(err) => Some(err),
            Self::OpenFailed(_) | Self::NotReady | Self::Closed | Self::ImportFailed(_) => None,
        }
    }
}

impl From<BundleError> for StoreError {
    fn from(value: BundleError) -> Self {
        Self::ImportFailed(value.to_string())
    }
}
