use crate::{ProgressWriter, SharedStore, StoreConfig, StoreError};
use doc_model::{DocumentId, DocumentMetadata};
use std::sync::Arc;

/// Entry point for the upload, library and task-linkage collaborators.
///
/// Reads and structural writes go straight to the shared store; reading
/// progress goes through the per-id [`ProgressWriter`].
#[derive(Clone)]
pub struct Library {
    store: SharedStore,
    progress: Arc<ProgressWriter>,
}

impl Library {
    pub fn new(store: SharedStore) -> Result<Self, StoreError> {
        let progress = Arc::new(ProgressWriter::spawn(store.clone())?);
        Ok(Self { store, progress })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(SharedStore::at_path(config.database_path()))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::new(SharedStore::in_memory())
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn progress(&self) -> &Arc<ProgressWriter> {
        &self.progress
    }

    pub fn upload(&self, name: &str, bytes: &[u8]) -> Result<DocumentMetadata, StoreError> {
        self.store.get()?.put(None, name, bytes)
    }

    /// Full replacement of an existing (or new) id; progress restarts at page 1.
    pub fn replace(
        &self,
        id: &DocumentId,
        name: &str,
        bytes: &[u8],
    ) -> Result<DocumentMetadata, StoreError> {
        self.progress.cancel(id)?;
        let meta = self.store.get()?.put(Some(id.clone()), name, bytes)?;
        self.progress.revive(id)?;
        Ok(meta)
    }

    pub fn list(&self) -> Result<Vec<DocumentMetadata>, StoreError> {
        self.store.get()?.list_metadata()
    }

    pub fn metadata(&self, id: &DocumentId) -> Result<Option<DocumentMetadata>, StoreError> {
        self.store.get()?.metadata(id)
    }

    pub fn read(&self, id: &DocumentId) -> Result<Vec<u8>, StoreError> {
        self.store.get()?.get(id)
    }

    /// Removes both regions. Pending progress for `id` is dropped and new
    /// intents are refused while the delete runs; afterwards they reach no
    /// record. A failed delete leaves progress for the live document working.
    pub fn delete(&self, id: &DocumentId) -> Result<bool, StoreError> {
        self.progress.retire(id)?;
        let deleted = self.store.get().and_then(|store| store.delete(id));
        self.progress.revive(id)?;

        if let Err(err) = &deleted {
            log::warn!("failed to delete {id}: {err}");
        }
        deleted
    }

    pub fn record_progress(&self, id: &DocumentId, page: u32) -> Result<Option<u64>, StoreError> {
        self.progress.submit(id, page)
    }
}
