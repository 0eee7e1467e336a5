//! View state errors

use flex_model::StorageError;
use flex_schema::SchemaError;

/// Errors from view state operations
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// Table not visible to the caller
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
