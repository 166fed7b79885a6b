//! Table store seam
//!
//! The walk only needs four things from a database: recreate it, create a
//! table, drop a table, insert a row. [`MemoryTableStore`] keeps that in a
//! map and is strict about misuse; the TDengine store lives in
//! [`crate::persistence`].

use std::sync::Mutex;

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::error::WorkError;

/// Backing store for the table payloads
pub trait TableStore: Send + Sync {
    /// Recreate the database from scratch.
    fn prepare(&self) -> Result<(), WorkError>;

    fn create_table(&self, name: &str) -> Result<(), WorkError>;

    fn drop_table(&self, name: &str) -> Result<(), WorkError>;

    /// Insert one `(ts, speed)` row.
    fn insert_row(&self, name: &str, speed: i32) -> Result<(), WorkError>;

    fn close(&self) -> Result<(), WorkError> {
        Ok(())
    }
}

/// Point-in-time view of a [`MemoryTableStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSnapshot {
    /// Live tables, sorted by name
    pub live_tables: Vec<String>,
    pub created: u64,
    pub dropped: u64,
    pub rows_inserted: u64,
}

#[derive(Debug, Default)]
struct MemoryInner {
    tables: FxHashMap<String, Vec<i32>>,
    created: u64,
    dropped: u64,
    rows_inserted: u64,
}

/// In-process table store
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.lock();
        let mut live_tables: Vec<String> = inner.tables.keys().cloned().collect();
        live_tables.sort();
        StoreSnapshot {
            live_tables,
            created: inner.created,
            dropped: inner.dropped,
            rows_inserted: inner.rows_inserted,
        }
    }

    /// Rows currently stored in `name`.
    pub fn rows(&self, name: &str) -> Option<Vec<i32>> {
        self.lock().tables.get(name).cloned()
    }
}

impl TableStore for MemoryTableStore {
    fn prepare(&self) -> Result<(), WorkError> {
        let mut inner = self.lock();
        *inner = MemoryInner::default();
        Ok(())
    }

    fn create_table(&self, name: &str) -> Result<(), WorkError> {
        let mut inner = self.lock();
        if inner.tables.contains_key(name) {
            return Err(WorkError::Store(format!("table already exists: {}", name)));
        }
        inner.tables.insert(name.to_string(), Vec::new());
        inner.created += 1;
        Ok(())
    }

    fn drop_table(&self, name: &str) -> Result<(), WorkError> {
        let mut inner = self.lock();
        if inner.tables.remove(name).is_none() {
            return Err(WorkError::Store(format!("table does not exist: {}", name)));
        }
        inner.dropped += 1;
        Ok(())
    }

    fn insert_row(&self, name: &str, speed: i32) -> Result<(), WorkError> {
        let mut inner = self.lock();
        let rows = inner
            .tables
            .get_mut(name)
            .ok_or_else(|| WorkError::Store(format!("table does not exist: {}", name)))?;
        rows.push(speed);
        inner.rows_inserted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_insert_drop() {
        let store = MemoryTableStore::new();
        store.create_table("table_1").unwrap();
        store.insert_row("table_1", 7).unwrap();
        store.insert_row("table_1", 8).unwrap();
        assert_eq!(store.rows("table_1"), Some(vec![7, 8]));

        store.drop_table("table_1").unwrap();
        let snap = store.snapshot();
        assert!(snap.live_tables.is_empty());
        assert_eq!((snap.created, snap.dropped, snap.rows_inserted), (1, 1, 2));
    }

    #[test]
    fn test_strict_about_missing_and_duplicate_tables() {
        let store = MemoryTableStore::new();
        assert!(store.drop_table("table_9").is_err());
        assert!(store.insert_row("table_9", 1).is_err());

        store.create_table("table_1").unwrap();
        let err = store.create_table("table_1").unwrap_err();
        assert_eq!(err.code(), "STORE_ERROR");
    }

    #[test]
    fn test_prepare_resets_everything() {
        let store = MemoryTableStore::new();
        store.create_table("table_1").unwrap();
        store.prepare().unwrap();
        assert_eq!(store.snapshot(), StoreSnapshot::default());
    }
}
