//! Snapshot persistence.
//!
//! A [`SessionStore`] keeps opaque snapshot bytes under a caller-chosen key.
//! The trait is synchronous: saves happen once per applied cycle, off the
//! engine lock, and are small enough not to warrant an async API.

use std::{collections::HashMap, path::Path, sync::Arc};

use parking_lot::Mutex;
use redb::{Database, TableDefinition};

use crate::error::StoreError;

/// Table: snapshots
/// Key: storage key chosen by the session owner
/// Value: CBOR-encoded session snapshot
const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

/// Key-value persistence for session snapshots.
pub trait SessionStore: Send + Sync + 'static {
    /// Bytes stored under `key`. `None` if nothing was saved.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `bytes` under `key`, replacing any previous value.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Remove whatever is stored under `key`.
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral sessions.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.lock().insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().remove(key);
        Ok(())
    }
}

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(SNAPSHOTS).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl SessionStore for RedbStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(SNAPSHOTS).map_err(|e| StoreError::Io(e.to_string()))?;

        let value = table.get(key).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(SNAPSHOTS).map_err(|e| StoreError::Io(e.to_string()))?;
            table.insert(key, bytes).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(SNAPSHOTS).map_err(|e| StoreError::Io(e.to_string()))?;
            table.remove(key).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}
