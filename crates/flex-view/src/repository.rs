//! View state storage

use crate::state::ViewState;
use dashmap::DashMap;
use flex_model::{StorageError, TableId, UserId};
use std::fmt::Debug;

/// Persistence for view states, keyed by `(user, table)`
#[async_trait::async_trait]
pub trait ViewStateRepository: Send + Sync + Debug {
    async fn get(&self, user_id: &UserId, table_id: TableId) -> Result<Option<ViewState>, StorageError>;

    async fn put(&self, user_id: &UserId, table_id: TableId, state: ViewState) -> Result<(), StorageError>;
}

/// In-process view state store
#[derive(Debug, Default)]
pub struct MemoryViewStateRepository {
    states: DashMap<(UserId, TableId), ViewState>,
}

impl MemoryViewStateRepository {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored states
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait::async_trait]
impl ViewStateRepository for MemoryViewStateRepository {
    async fn get(&self, user_id: &UserId, table_id: TableId) -> Result<Option<ViewState>, StorageError> {
        Ok(self
            .states
            .get(&(user_id.clone(), table_id))
            .map(|s| s.value().clone()))
    }

    async fn put(&self, user_id: &UserId, table_id: TableId, state: ViewState) -> Result<(), StorageError> {
        self.states.insert((user_id.clone(), table_id), state);
        Ok(())
    }
}
