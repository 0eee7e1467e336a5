//! Error taxonomy of the service facade
//!
//! Each component crate has its own error enum; [`FlexError`] folds them
//! into the categories callers act on:
//! - Validation / InvalidQuery: fix the request
//! - SchemaConflict / WriteConflict: reload and retry
//! - NotFound / Expired: give up
//! - Storage: opaque repository failure

use chrono::{DateTime, Utc};
use flex_model::{RecordId, StorageError, TableId, ValidationErrors};
use flex_query::QueryError;
use flex_record::RecordError;
use flex_schema::{SchemaConflict, SchemaError};
use flex_view::ViewError;
use std::fmt;

/// Resource a [`FlexError::NotFound`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Table(TableId),
    Record(RecordId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(id) => write!(f, "table {id}"),
            Self::Record(id) => write!(f, "record {id}"),
        }
    }
}

/// Unified error of [`crate::FlexTables`]
#[derive(Debug, thiserror::Error)]
pub enum FlexError {
    /// Per-field validation failures, all of them
    #[error(transparent)]
    Validation(ValidationErrors),

    /// Schema request conflicts with the current table state
    #[error(transparent)]
    SchemaConflict(SchemaConflict),

    /// Record changed since the caller read it
    #[error("record {record_id} was modified at {actual}, expected {expected}")]
    WriteConflict {
        record_id: RecordId,
        expected: DateTime<Utc>,
        actual: DateTime<Utc>,
    },

    /// Absent, foreign to the caller's workspace, or past retention
    #[error("{0} not found")]
    NotFound(Missing),

    /// Restore attempted after the retention window
    #[error("record {record_id} was deleted at {deleted_at} and can no longer be restored")]
    Expired {
        record_id: RecordId,
        deleted_at: DateTime<Utc>,
    },

    /// Malformed or disallowed query part
    #[error("invalid query at {field}: {reason}")]
    InvalidQuery { field: String, reason: String },

    #[error(transparent)]
    Storage(StorageError),
}

impl FlexError {
    /// Reloading the resource and resubmitting may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable_after_reload(&self) -> bool {
        matches!(self, Self::SchemaConflict(_) | Self::WriteConflict { .. })
    }

    /// No retry can succeed
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired { .. })
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::SchemaConflict(_) => "schema_conflict",
            Self::WriteConflict { .. } => "write_conflict",
            Self::NotFound(_) => "not_found",
            Self::Expired { .. } => "expired",
            Self::InvalidQuery { .. } => "invalid_query",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<SchemaError> for FlexError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Validation(errors) => Self::Validation(errors),
            SchemaError::Conflict(conflict) => Self::SchemaConflict(conflict),
            SchemaError::NotFound(id) => Self::NotFound(Missing::Table(id)),
            SchemaError::Storage(err) => Self::Storage(err),
        }
    }
}

impl From<RecordError> for FlexError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Validation(errors) => Self::Validation(errors),
            RecordError::Schema(err) => err.into(),
            RecordError::WriteConflict {
                record_id,
                expected,
                actual,
            } => Self::WriteConflict {
                record_id,
                expected,
                actual,
            },
            RecordError::NotFound(id) => Self::NotFound(Missing::Record(id)),
            RecordError::Expired { record_id, deleted_at } => Self::Expired { record_id, deleted_at },
            RecordError::Storage(err) => Self::Storage(err),
        }
    }
}

impl From<QueryError> for FlexError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Invalid { field, reason } => Self::InvalidQuery { field, reason },
            QueryError::Record(err) => err.into(),
        }
    }
}

impl From<ViewError> for FlexError {
    fn from(err: ViewError) -> Self {
        match err {
            ViewError::Schema(err) => err.into(),
            ViewError::Storage(err) => Self::Storage(err),
        }
    }
}
