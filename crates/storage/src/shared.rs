use crate::{BlobStore, StoreError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

#[derive(Debug)]
struct Inner {
    location: Location,
    slot: Mutex<Option<Arc<BlobStore>>>,
}

/// Process-wide handle to a lazily opened [`BlobStore`].
///
/// The database is opened on the first [`SharedStore::get`] call. Callers
/// racing that first call wait on the same lock, so only one open ever runs.
/// A failed open is not remembered; the next caller tries again.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<Inner>,
}

impl SharedStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self { inner: Arc::new(Inner { location, slot: Mutex::new(None) }) }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.inner.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    pub fn get(&self) -> Result<Arc<BlobStore>, StoreError> {
        let mut slot = self.inner.slot.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = match &self.inner.location {
            Location::File(path) => BlobStore::open(path),
            Location::Memory => BlobStore::open_in_memory(),
        }
        .inspect_err(|err| log::warn!("failed to open blob store: {err}"))?;

        let store = Arc::new(store);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    pub fn is_open(&self) -> bool {
        self.inner.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}
