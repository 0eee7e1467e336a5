//! Schema errors

use flex_model::{PropertyKey, StorageError, TableId, ValidationErrors};
use serde::Serialize;

/// Errors from schema operations
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// One or more property definitions are invalid
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// Schema state conflicts with the request
    #[error(transparent)]
    Conflict(#[from] SchemaConflict),

    /// Table absent or owned by another workspace
    #[error("table not found: {0}")]
    NotFound(TableId),

    /// Repository failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SchemaError {
    /// Whether the caller should reload the table and retry
    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Conflict(SchemaConflict::StaleVersion { .. }))
    }
}

/// Conflicts between a schema request and the current table state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SchemaConflict {
    /// Key already used by a live property
    #[error("duplicate property key '{key}'")]
    DuplicateKey { key: PropertyKey },

    /// Key belonged to a removed property and cannot be reused
    #[error("property key '{key}' was removed and cannot be reused")]
    RetiredKey { key: PropertyKey },

    /// Keys never change once assigned
    #[error("property key '{key}' is immutable")]
    KeyImmutable { key: String },

    /// Caller's expected version is behind the stored one
    #[error("stale schema version: expected {expected}, current {actual}")]
    StaleVersion { expected: u64, actual: u64 },

    /// Archived tables accept no schema or record writes
    #[error("table {table_id} is archived")]
    Archived { table_id: TableId },
}
