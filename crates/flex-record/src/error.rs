//! Record errors

use chrono::{DateTime, Utc};
use flex_model::{RecordId, StorageError, ValidationErrors};
use flex_schema::SchemaError;

/// Errors from record operations
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// One or more fields are invalid
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// Owning table missing, foreign or archived
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Record changed since the caller read it
    #[error("record {record_id} was modified at {actual}, expected {expected}")]
    WriteConflict {
        record_id: RecordId,
        expected: DateTime<Utc>,
        actual: DateTime<Utc>,
    },

    /// Record absent, foreign, deleted when not asked for, or past retention
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Restore attempted after the retention window
    #[error("record {record_id} was deleted at {deleted_at} and can no longer be restored")]
    Expired {
        record_id: RecordId,
        deleted_at: DateTime<Utc>,
    },

    /// Repository failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RecordError {
    /// Whether reloading the record and retrying may succeed
    #[inline]
    #[must_use]
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, Self::WriteConflict { .. })
    }
}
