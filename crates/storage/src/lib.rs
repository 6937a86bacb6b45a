//! Local document storage.
//!
//! Binary documents and their metadata live in two co-located SQLite tables
//! keyed by document id. Every write that touches both tables runs in a single
//! transaction, so a document is never left with only one half on disk.

mod blob_store;
mod config;
mod library;
mod progress;
mod shared;

pub use blob_store::BlobStore;
pub use config::StoreConfig;
pub use library::Library;
pub use progress::{ProgressOutcome, ProgressWriter};
pub use shared::SharedStore;

use doc_model::{DocumentId, ModelError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("document {0} not found")]
    NotFound(DocumentId),
    #[error("page {0} is not a valid 1-based page number")]
    InvalidPage(u32),
    #[error("invalid document record: {0}")]
    Model(#[from] ModelError),
    #[error("storage lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// True when the engine itself could not be opened or transacted.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::Io(_) | Self::NoDataDirectory | Self::Poisoned
        )
    }
}
