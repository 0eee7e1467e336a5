//! Record storage
//!
//! [`RecordRepository`] writes are conditional: updates compare-and-set on
//! `updated_at`, and purge deletes a row only while it is still soft-deleted
//! and still past the cutoff, so a purge racing a restore never loses the
//! restored record.

use crate::record::Record;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flex_model::{RecordId, StorageError, TableId};
use std::fmt::Debug;

/// Result of a conditional record write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Stored `updated_at` differs from the expected one
    Stale { actual: DateTime<Utc> },
    Missing,
}

/// Persistence for records
#[async_trait::async_trait]
pub trait RecordRepository: Send + Sync + Debug {
    async fn insert(&self, record: Record) -> Result<(), StorageError>;

    async fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError>;

    /// Replace the stored record iff its `updated_at` equals `expected_updated_at`
    async fn compare_and_set(
        &self,
        next: Record,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome, StorageError>;

    /// All records of a table, deleted ones included
    async fn scan(&self, table_id: TableId) -> Result<Vec<Record>, StorageError>;

    /// Up to `limit` ids soft-deleted before `cutoff`
    async fn expired_ids(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<RecordId>, StorageError>;

    /// Hard-delete `id` if it is still soft-deleted before `cutoff`
    ///
    /// Returns whether a row was removed.
    async fn purge_if_expired(&self, id: RecordId, cutoff: DateTime<Utc>) -> Result<bool, StorageError>;
}

/// In-process record store
#[derive(Debug, Default)]
pub struct MemoryRecordRepository {
    records: DashMap<RecordId, Record>,
}

impl MemoryRecordRepository {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored rows, deleted included
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl RecordRepository for MemoryRecordRepository {
    async fn insert(&self, record: Record) -> Result<(), StorageError> {
        match self.records.entry(record.id) {
            Entry::Occupied(_) => Err(StorageError(format!("record {} already exists", record.id))),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn compare_and_set(
        &self,
        next: Record,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome, StorageError> {
        match self.records.entry(next.id) {
            Entry::Vacant(_) => Ok(WriteOutcome::Missing),
            Entry::Occupied(mut slot) => {
                let actual = slot.get().updated_at;
                if actual != expected_updated_at {
                    return Ok(WriteOutcome::Stale { actual });
                }
                slot.insert(next);
                Ok(WriteOutcome::Written)
            }
        }
    }

    async fn scan(&self, table_id: TableId) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.table_id == table_id)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn expired_ids(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<RecordId>, StorageError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.is_expired(cutoff))
            .map(|r| r.id)
            .take(limit)
            .collect())
    }

    async fn purge_if_expired(&self, id: RecordId, cutoff: DateTime<Utc>) -> Result<bool, StorageError> {
        Ok(self.records.remove_if(&id, |_, r| r.is_expired(cutoff)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordData;
    use chrono::Duration;
    use flex_model::UserId;

    fn record(deleted_at: Option<DateTime<Utc>>) -> Record {
        let now = Utc::now();
        Record {
            id: RecordId::new(),
            table_id: TableId::new(),
            data: RecordData::new(),
            created_at: now,
            updated_at: now,
            created_by: UserId::new("u"),
            updated_by: UserId::new("u"),
            deleted_at,
            schema_version_at_write: 1,
        }
    }

    #[tokio::test]
    async fn compare_and_set_detects_stale_token() {
        let repo = MemoryRecordRepository::new();
        let rec = record(None);
        let token = rec.updated_at;
        repo.insert(rec.clone()).await.unwrap();

        let first = rec.touched(&UserId::new("a"), token + Duration::seconds(1));
        let second = rec.touched(&UserId::new("b"), token + Duration::seconds(2));

        assert_eq!(repo.compare_and_set(first.clone(), token).await.unwrap(), WriteOutcome::Written);
        assert_eq!(
            repo.compare_and_set(second, token).await.unwrap(),
            WriteOutcome::Stale {
                actual: first.updated_at
            }
        );
    }

    #[tokio::test]
    async fn purge_only_removes_expired_rows() {
        let repo = MemoryRecordRepository::new();
        let now = Utc::now();
        let old = record(Some(now - Duration::days(40)));
        let recent = record(Some(now - Duration::days(1)));
        let live = record(None);
        for r in [&old, &recent, &live] {
            repo.insert(r.clone()).await.unwrap();
        }

        let cutoff = now - Duration::days(30);
        assert_eq!(repo.expired_ids(cutoff, 10).await.unwrap(), vec![old.id]);
        assert!(repo.purge_if_expired(old.id, cutoff).await.unwrap());
        assert!(!repo.purge_if_expired(old.id, cutoff).await.unwrap());
        assert!(!repo.purge_if_expired(recent.id, cutoff).await.unwrap());
        assert!(!repo.purge_if_expired(live.id, cutoff).await.unwrap());
        assert_eq!(repo.len(), 2);
    }
}
