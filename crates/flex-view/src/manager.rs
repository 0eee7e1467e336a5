//! View state manager
//!
//! Reads never persist: a user who never touched a table's view gets the
//! default state and nothing is stored until the first command or put.
//! Writes are last-writer-wins per `(user, table)`.

use crate::error::ViewError;
use crate::repository::ViewStateRepository;
use crate::state::{ViewCommand, ViewState};
use flex_model::{PropertyKey, RequestContext, TableId};
use flex_schema::SchemaManager;
use std::sync::Arc;

/// Per-user presentation state of tables
#[derive(Debug, Clone)]
pub struct ViewStateManager {
    schemas: SchemaManager,
    repo: Arc<dyn ViewStateRepository>,
}

impl ViewStateManager {
    pub fn new(schemas: SchemaManager, repo: Arc<dyn ViewStateRepository>) -> Self {
        Self { schemas, repo }
    }

    /// Caller's state for the table, default if never stored
    pub async fn get(&self, ctx: &RequestContext, table_id: TableId) -> Result<ViewState, ViewError> {
        self.schemas.get_table(ctx, table_id).await?;
        let state = self.repo.get(&ctx.user_id, table_id).await?;
        Ok(state.unwrap_or_default())
    }

    /// Replace the caller's state, normalized
    pub async fn put(&self, ctx: &RequestContext, table_id: TableId, mut state: ViewState) -> Result<ViewState, ViewError> {
        self.schemas.get_table(ctx, table_id).await?;
        state.normalize();
        self.store(ctx, table_id, state).await
    }

    /// Apply one command to the caller's state
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        table_id: TableId,
        command: ViewCommand,
    ) -> Result<ViewState, ViewError> {
        let mut state = self.get(ctx, table_id).await?;
        state.apply(command);
        self.store(ctx, table_id, state).await
    }

    /// Rendered column order of the caller's view
    pub async fn layout(&self, ctx: &RequestContext, table_id: TableId) -> Result<Vec<PropertyKey>, ViewError> {
        let table = self.schemas.get_table(ctx, table_id).await?;
        let state = self.repo.get(&ctx.user_id, table_id).await?.unwrap_or_default();
        Ok(state.layout(&table))
    }

    async fn store(&self, ctx: &RequestContext, table_id: TableId, mut state: ViewState) -> Result<ViewState, ViewError> {
        state.updated_at = Some(self.schemas.clock().now());
        self.repo.put(&ctx.user_id, table_id, state.clone()).await?;
        tracing::debug!("Stored view state of {} on table {}", ctx.user_id, table_id);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryViewStateRepository;
    use crate::state::{ColumnSide, PinnedColumns};
    use flex_model::{ManualClock, PropertySpec, PropertyType};
    use flex_schema::{MemoryTableRepository, NewTable, SchemaError};

    async fn setup() -> (ViewStateManager, Arc<MemoryViewStateRepository>, TableId) {
        let schemas = SchemaManager::new(Arc::new(MemoryTableRepository::new()), Arc::new(ManualClock::default()));
        let table = schemas
            .create_table(
                &RequestContext::new("ws", "alice"),
                NewTable::new("T")
                    .with_property(PropertySpec::new("a", PropertyType::Text))
                    .with_property(PropertySpec::new("b", PropertyType::Text)),
            )
            .await
            .unwrap();
        let repo = Arc::new(MemoryViewStateRepository::new());
        (ViewStateManager::new(schemas, repo.clone()), repo, table.id)
    }

    #[tokio::test]
    async fn reads_do_not_persist() {
        let (views, repo, table_id) = setup().await;
        let ctx = RequestContext::new("ws", "alice");
        let state = views.get(&ctx, table_id).await.unwrap();
        assert_eq!(state, ViewState::default());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn state_is_per_user() {
        let (views, repo, table_id) = setup().await;
        let alice = RequestContext::new("ws", "alice");
        let bob = RequestContext::new("ws", "bob");

        let state = views
            .apply(
                &alice,
                table_id,
                ViewCommand::PinColumn {
                    key: "b".into(),
                    side: ColumnSide::Left,
                },
            )
            .await
            .unwrap();
        assert!(state.updated_at.is_some());
        assert_eq!(repo.len(), 1);

        assert_eq!(views.get(&bob, table_id).await.unwrap(), ViewState::default());
        let layout = views.layout(&alice, table_id).await.unwrap();
        assert_eq!(layout.iter().map(PropertyKey::as_str).collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn put_normalizes() {
        let (views, _, table_id) = setup().await;
        let ctx = RequestContext::new("ws", "alice");
        let stored = views
            .put(
                &ctx,
                table_id,
                ViewState {
                    pinned_columns: PinnedColumns {
                        left: vec!["a".into()],
                        right: vec!["a".into(), "b".into(), "b".into()],
                    },
                    ..ViewState::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(stored.pinned_columns.right, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn foreign_tables_are_not_found() {
        let (views, _, table_id) = setup().await;
        let other = RequestContext::new("ws-2", "alice");
        assert!(matches!(
            views.get(&other, table_id).await,
            Err(ViewError::Schema(SchemaError::NotFound(_)))
        ));
    }
}
