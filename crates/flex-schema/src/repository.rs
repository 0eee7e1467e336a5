//! Table storage
//!
//! [`TableRepository`] is the persistence seam for schemas. Writes are
//! compare-and-swap on `schema_version`, so two admins editing the same
//! schema cannot silently overwrite each other.

use crate::table::Table;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flex_model::{StorageError, TableId, WorkspaceId};
use std::fmt::Debug;
use std::sync::Arc;

/// Result of a versioned table write
#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    /// Stored version matched; `next` is now current
    Swapped,
    /// Stored version moved on
    Stale { actual: u64 },
    /// No table with that id
    Missing,
}

/// Persistence for table snapshots
#[async_trait::async_trait]
pub trait TableRepository: Send + Sync + Debug {
    /// Store a brand-new table
    async fn insert(&self, table: Arc<Table>) -> Result<(), StorageError>;

    /// Current snapshot by id, regardless of workspace
    async fn get(&self, id: TableId) -> Result<Option<Arc<Table>>, StorageError>;

    /// Every table of a workspace, archived included
    async fn list(&self, workspace_id: &WorkspaceId) -> Result<Vec<Arc<Table>>, StorageError>;

    /// Replace the stored table iff its version is `expected_version`
    async fn compare_and_swap(
        &self,
        next: Arc<Table>,
        expected_version: u64,
    ) -> Result<SwapOutcome, StorageError>;
}

/// In-process table store
#[derive(Debug, Default)]
pub struct MemoryTableRepository {
    tables: DashMap<TableId, Arc<Table>>,
}

impl MemoryTableRepository {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[async_trait::async_trait]
impl TableRepository for MemoryTableRepository {
    async fn insert(&self, table: Arc<Table>) -> Result<(), StorageError> {
        match self.tables.entry(table.id) {
            Entry::Occupied(_) => Err(StorageError(format!("table {} already exists", table.id))),
            Entry::Vacant(slot) => {
                slot.insert(table);
                Ok(())
            }
        }
    }

    async fn get(&self, id: TableId) -> Result<Option<Arc<Table>>, StorageError> {
        Ok(self.tables.get(&id).map(|t| Arc::clone(t.value())))
    }

    async fn list(&self, workspace_id: &WorkspaceId) -> Result<Vec<Arc<Table>>, StorageError> {
        let mut tables: Vec<_> = self
            .tables
            .iter()
            .filter(|t| &t.workspace_id == workspace_id)
            .map(|t| Arc::clone(t.value()))
            .collect();
        tables.sort_by_key(|t| (t.created_at, t.id));
        Ok(tables)
    }

    async fn compare_and_swap(
        &self,
        next: Arc<Table>,
        expected_version: u64,
    ) -> Result<SwapOutcome, StorageError> {
        // The entry guard holds the shard lock across check and write
        match self.tables.entry(next.id) {
            Entry::Vacant(_) => Ok(SwapOutcome::Missing),
            Entry::Occupied(mut slot) => {
                let actual = slot.get().schema_version;
                if actual != expected_version {
                    return Ok(SwapOutcome::Stale { actual });
                }
                slot.insert(next);
                Ok(SwapOutcome::Swapped)
            }
        }
    }
}
