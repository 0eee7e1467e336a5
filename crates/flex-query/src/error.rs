//! Query errors

use flex_record::RecordError;

/// Errors from query evaluation
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Malformed or disallowed query part
    #[error("invalid query at {field}: {reason}")]
    Invalid { field: String, reason: String },

    /// Table not visible, or storage failure while scanning
    #[error(transparent)]
    Record(#[from] RecordError),
}

impl QueryError {
    #[inline]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
