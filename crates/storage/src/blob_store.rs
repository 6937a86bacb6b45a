use crate::StoreError;
use doc_model::{DocumentId, DocumentMetadata};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Durable id -> bytes and id -> metadata mapping.
///
/// All access goes through one connection behind a mutex, which also
/// serializes the three writers (upload, progress update, delete) per id.
#[derive(Debug)]
pub struct BlobStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl BlobStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let store = Self { path: Some(path), conn: Mutex::new(conn) };
        store.migrate()?;
        log::debug!("opened blob store at {}", store.describe());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self { path: None, conn: Mutex::new(Connection::open_in_memory()?) };
        store.migrate()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn describe(&self) -> String {
        self.path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| ":memory:".to_owned())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS files (
              id TEXT PRIMARY KEY,
              bytes BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
              id TEXT PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
              name TEXT NOT NULL,
              size_label TEXT NOT NULL,
              last_page INTEGER NOT NULL DEFAULT 1 CHECK (last_page >= 1),
              created_at_ms INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Stores `bytes` and (re)initializes metadata with `last_page = 1`.
    ///
    /// Both tables are written in one transaction; an error rolls back both.
    pub fn put(
        &self,
        id: Option<DocumentId>,
        name: &str,
        bytes: &[u8],
    ) -> Result<DocumentMetadata, StoreError> {
        let id = id.unwrap_or_else(DocumentId::generate);
        let meta = DocumentMetadata::new(id, name, bytes.len() as u64);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO files (id, bytes) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET bytes = excluded.bytes",
            params![meta.id.as_str(), bytes],
        )?;
        tx.execute(
            "INSERT INTO meta (id, name, size_label, last_page, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               size_label = excluded.size_label,
               last_page = excluded.last_page,
               created_at_ms = excluded.created_at_ms",
            params![meta.id.as_str(), meta.name, meta.size_label, meta.last_page, meta.created_at],
        )?;
        tx.commit()?;

        log::debug!("stored {} ({}, {})", meta.id, meta.name, meta.size_label);
        Ok(meta)
    }

    pub fn get(&self, id: &DocumentId) -> Result<Vec<u8>, StoreError> {
        self.conn()?
            .query_row("SELECT bytes FROM files WHERE id = ?1", [id.as_str()], |row| row.get(0))
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    pub fn metadata(&self, id: &DocumentId) -> Result<Option<DocumentMetadata>, StoreError> {
        let meta = self
            .conn()?
            .query_row(
                "SELECT id, name, size_label, last_page, created_at_ms FROM meta WHERE id = ?1",
                [id.as_str()],
                metadata_from_row,
            )
            .optional()?;
        Ok(meta)
    }

    pub fn list_metadata(&self) -> Result<Vec<DocumentMetadata>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, size_label, last_page, created_at_ms FROM meta
             ORDER BY created_at_ms ASC, id ASC",
        )?;
        let rows = stmt.query_map([], metadata_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Merges `page` into the existing metadata record.
    ///
    /// Unknown ids are a silent no-op; the return value reports whether a
    /// record was present.
    pub fn update_last_page(&self, id: &DocumentId, page: u32) -> Result<bool, StoreError> {
        if page == 0 {
            return Err(StoreError::InvalidPage(page));
        }

        let changed = self
            .conn()?
            .execute("UPDATE meta SET last_page = ?2 WHERE id = ?1", params![id.as_str(), page])?;
        Ok(changed > 0)
    }

    /// Removes both regions for `id`. Returns whether anything was removed.
    pub fn delete(&self, id: &DocumentId) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let meta_rows = tx.execute("DELETE FROM meta WHERE id = ?1", [id.as_str()])?;
        let file_rows = tx.execute("DELETE FROM files WHERE id = ?1", [id.as_str()])?;
        tx.commit()?;

        let removed = meta_rows + file_rows > 0;
        if removed {
            log::debug!("deleted {id}");
        }
        Ok(removed)
    }

    pub fn contains(&self, id: &DocumentId) -> Result<bool, StoreError> {
        let found = self
            .conn()?
            .query_row("SELECT 1 FROM files WHERE id = ?1", [id.as_str()], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentMetadata> {
    let raw_id: String = row.get(0)?;
    let id = DocumentId::parse(raw_id)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err)))?;

    Ok(DocumentMetadata {
        id,
        name: row.get(1)?,
        size_label: row.get(2)?,
        last_page: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> BlobStore {
        BlobStore::open_in_memory().expect("in-memory store should open")
    }

    #[test]
    fn put_generates_id_and_initializes_metadata() {
        let store = store();
        let meta = store.put(None, "book.pdf", b"%PDF-1.4").expect("put should succeed");

        assert!(meta.id.as_str().starts_with("doc_"));
        assert_eq!(meta.last_page, 1);
        assert_eq!(store.get(&meta.id).expect("bytes should exist"), b"%PDF-1.4");
        assert_eq!(store.metadata(&meta.id).expect("query should succeed"), Some(meta));
    }

    #[test]
    fn put_with_existing_id_replaces_bytes_and_resets_progress() {
        let store = store();
        let id = DocumentId::parse("doc_fixed").expect("valid id");
        store.put(Some(id.clone()), "v1.pdf", b"one").expect("first put");
        store.update_last_page(&id, 9).expect("update should succeed");

        let meta = store.put(Some(id.clone()), "v2.pdf", b"two").expect("second put");

        assert_eq!(meta.last_page, 1);
        assert_eq!(store.get(&id).expect("bytes"), b"two");
        let listed = store.list_metadata().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "v2.pdf");
        assert_eq!(listed[0].last_page, 1);
    }

    #[test]
    fn update_last_page_rejects_zero() {
        let store = store();
        let meta = store.put(None, "a.pdf", b"a").expect("put");

        let err = store.update_last_page(&meta.id, 0).expect_err("page 0 is invalid");
        assert!(matches!(err, StoreError::InvalidPage(0)));
    }

    #[test]
    fn update_last_page_is_idempotent() {
        let store = store();
        let meta = store.put(None, "a.pdf", b"a").expect("put");

        for _ in 0..3 {
            assert!(store.update_last_page(&meta.id, 4).expect("update"));
        }

        let stored = store.metadata(&meta.id).expect("query").expect("record");
        assert_eq!(stored.last_page, 4);
        assert_eq!(stored.name, meta.name);
        assert_eq!(stored.created_at, meta.created_at);
    }

    #[test]
    fn delete_is_noop_for_unknown_id() {
        let store = store();
        let id = DocumentId::parse("doc_missing").expect("valid id");

        assert!(!store.delete(&id).expect("delete should not fail"));
    }

    #[test]
    fn contains_tracks_binary_region() {
        let store = store();
        let meta = store.put(None, "a.pdf", b"a").expect("put");
        assert!(store.contains(&meta.id).expect("contains"));

        store.delete(&meta.id).expect("delete");
        assert!(!store.contains(&meta.id).expect("contains"));
    }
}
