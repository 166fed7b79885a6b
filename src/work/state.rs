//! Walk state: what we believe the database looks like.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::id_alloc::SequentialIdAllocator;

use super::error::WorkError;
use super::store::TableStore;

/// Shared collaborator behind the table payloads.
///
/// Every operation holds the id-range lock across both the range update and
/// the matching store call, so payloads that overlap on different worker
/// threads always find the store and the range in agreement: a table is
/// created before anyone can drop it, and dropped only once.
pub struct WalkState {
    table_ids: Mutex<SequentialIdAllocator>,
    store: Arc<dyn TableStore>,
}

impl WalkState {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            table_ids: Mutex::new(SequentialIdAllocator::new()),
            store,
        }
    }

    fn ids(&self) -> MutexGuard<'_, SequentialIdAllocator> {
        self.table_ids
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Allocate the next table id and create its table.
    pub fn create_next(&self) -> Result<String, WorkError> {
        let mut ids = self.ids();
        let table = Self::table_name(ids.allocate());
        self.store.create_table(&table)?;
        Ok(table)
    }

    /// Drop the oldest live table. `None` when nothing is live.
    ///
    /// The id leaves the range only after the store has dropped the table.
    pub fn drop_oldest(&self) -> Result<Option<String>, WorkError> {
        let mut ids = self.ids();
        let Some(id) = ids.oldest() else {
            return Ok(None);
        };
        let table = Self::table_name(id);
        self.store.drop_table(&table)?;
        ids.release();
        Ok(Some(table))
    }

    /// Insert one row into the newest live table. `None` when nothing is live.
    pub fn insert_newest(&self, speed: i32) -> Result<Option<String>, WorkError> {
        let ids = self.ids();
        let Some(id) = ids.newest() else {
            return Ok(None);
        };
        let table = Self::table_name(id);
        self.store.insert_row(&table, speed)?;
        Ok(Some(table))
    }

    pub fn live_count(&self) -> u64 {
        self.ids().len()
    }

    pub fn table_name(id: u64) -> String {
        format!("table_{}", id)
    }
}

impl std::fmt::Debug for WalkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalkState")
            .field("table_ids", &*self.ids())
            .finish_non_exhaustive()
    }
}
