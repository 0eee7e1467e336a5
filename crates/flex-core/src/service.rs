//! FlexTables service facade
//!
//! Wires the schema manager, record store, query engine and view state
//! manager over one set of repositories and one clock, and maps every
//! component error into [`FlexError`].

use crate::config::{ConfigError, FlexConfig};
use crate::error::FlexError;
use crate::worker::PurgeWorker;
use chrono::{DateTime, Utc};
use flex_model::{Clock, PropertyKey, RecordId, RequestContext, SystemClock, TableId};
use flex_query::{Page, Query, QueryEngine};
use flex_record::{MemoryRecordRepository, PurgeReport, RecordPayload, RecordRepository, RecordStore, ResolvedRecord};
use flex_schema::{MemoryTableRepository, NewTable, SchemaManager, SchemaOp, Table, TableRepository};
use flex_view::{MemoryViewStateRepository, ViewCommand, ViewState, ViewStateManager, ViewStateRepository};
use std::sync::Arc;
use tokio::sync::watch;

/// Storage behind one service instance
#[derive(Debug, Clone)]
pub struct Repositories {
    pub tables: Arc<dyn TableRepository>,
    pub records: Arc<dyn RecordRepository>,
    pub views: Arc<dyn ViewStateRepository>,
}

impl Repositories {
    /// Fresh in-memory repositories
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            tables: Arc::new(MemoryTableRepository::new()),
            records: Arc::new(MemoryRecordRepository::new()),
            views: Arc::new(MemoryViewStateRepository::new()),
        }
    }
}

/// Flexible table engine
///
/// Cheap to clone; clones share repositories and clock.
#[derive(Debug, Clone)]
pub struct FlexTables {
    config: FlexConfig,
    schemas: SchemaManager,
    records: RecordStore,
    queries: QueryEngine,
    views: ViewStateManager,
}

impl FlexTables {
    /// In-memory engine on the wall clock
    pub fn new(config: FlexConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// In-memory engine on a caller-supplied clock
    pub fn with_clock(config: FlexConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Self::from_parts(config, clock, Repositories::in_memory())
    }

    /// Engine over explicit repositories
    pub fn from_parts(config: FlexConfig, clock: Arc<dyn Clock>, repos: Repositories) -> Result<Self, ConfigError> {
        config.validate()?;

        let schemas = SchemaManager::new(repos.tables, clock).with_key_policy(config.key_policy());
        let records = RecordStore::new(schemas.clone(), repos.records)
            .with_retention(config.retention())
            .with_purge_batch_size(config.purge_batch_size);
        let queries =
            QueryEngine::new(records.clone()).with_page_sizes(config.default_page_size, config.max_page_size);
        let views = ViewStateManager::new(schemas.clone(), repos.views);

        tracing::info!(
            "Flextable engine ready (retention: {} days, case-insensitive keys: {})",
            config.retention_days,
            config.case_insensitive_keys
        );
        Ok(Self {
            config,
            schemas,
            records,
            queries,
            views,
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &FlexConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn schemas(&self) -> &SchemaManager {
        &self.schemas
    }

    #[inline]
    #[must_use]
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    #[inline]
    #[must_use]
    pub fn queries(&self) -> &QueryEngine {
        &self.queries
    }

    #[inline]
    #[must_use]
    pub fn views(&self) -> &ViewStateManager {
        &self.views
    }

    /// Background purge worker bound to this engine's record store
    #[must_use]
    pub fn purge_worker(&self) -> PurgeWorker {
        PurgeWorker::new(self.records.clone(), self.config.purge_interval())
    }

    // ========================================================================
    // Tables
    // ========================================================================

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, name = %new.name))]
    pub async fn create_table(&self, ctx: &RequestContext, new: NewTable) -> Result<Arc<Table>, FlexError> {
        Ok(self.schemas.create_table(ctx, new).await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, %table_id))]
    pub async fn get_table(&self, ctx: &RequestContext, table_id: TableId) -> Result<Arc<Table>, FlexError> {
        Ok(self.schemas.get_table(ctx, table_id).await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id))]
    pub async fn list_tables(
        &self,
        ctx: &RequestContext,
        include_archived: bool,
    ) -> Result<Vec<Arc<Table>>, FlexError> {
        Ok(self.schemas.list_tables(ctx, include_archived).await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, %table_id, expected_version))]
    pub async fn update_schema(
        &self,
        ctx: &RequestContext,
        table_id: TableId,
        expected_version: u64,
        ops: &[SchemaOp],
    ) -> Result<Arc<Table>, FlexError> {
        Ok(self
            .schemas
            .update_schema(ctx, table_id, expected_version, ops)
            .await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, %table_id))]
    pub async fn archive_table(&self, ctx: &RequestContext, table_id: TableId) -> Result<Arc<Table>, FlexError> {
        Ok(self.schemas.archive_table(ctx, table_id).await?)
    }

    // ========================================================================
    // Records
    // ========================================================================

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, %table_id))]
    pub async fn create_record(
        &self,
        ctx: &RequestContext,
        table_id: TableId,
        payload: RecordPayload,
    ) -> Result<ResolvedRecord, FlexError> {
        Ok(self.records.create_record(ctx, table_id, payload).await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, %record_id))]
    pub async fn get_record(
        &self,
        ctx: &RequestContext,
        record_id: RecordId,
        include_deleted: bool,
    ) -> Result<ResolvedRecord, FlexError> {
        Ok(self.records.get_record(ctx, record_id, include_deleted).await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, %record_id))]
    pub async fn update_record(
        &self,
        ctx: &RequestContext,
        record_id: RecordId,
        partial: RecordPayload,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<ResolvedRecord, FlexError> {
        Ok(self
            .records
            .update_record(ctx, record_id, partial, expected_updated_at)
            .await?)
    }

    /// Soft delete
    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, %record_id))]
    pub async fn delete_record(&self, ctx: &RequestContext, record_id: RecordId) -> Result<ResolvedRecord, FlexError> {
        Ok(self.records.soft_delete(ctx, record_id).await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, %record_id))]
    pub async fn restore_record(&self, ctx: &RequestContext, record_id: RecordId) -> Result<ResolvedRecord, FlexError> {
        Ok(self.records.restore(ctx, record_id).await?)
    }

    /// One purge sweep over every table
    pub async fn purge_expired(&self, cancel: &watch::Receiver<bool>) -> Result<PurgeReport, FlexError> {
        Ok(self.records.purge_expired(cancel).await?)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[tracing::instrument(
        skip_all,
        fields(workspace = %ctx.workspace_id, %table_id, filters = query.filters.len(), sorts = query.sort.len())
    )]
    pub async fn query(&self, ctx: &RequestContext, table_id: TableId, query: Query) -> Result<Page, FlexError> {
        Ok(self.queries.query(ctx, table_id, query).await?)
    }

    // ========================================================================
    // View state
    // ========================================================================

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, user = %ctx.user_id, %table_id))]
    pub async fn view_state(&self, ctx: &RequestContext, table_id: TableId) -> Result<ViewState, FlexError> {
        Ok(self.views.get(ctx, table_id).await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, user = %ctx.user_id, %table_id))]
    pub async fn put_view_state(
        &self,
        ctx: &RequestContext,
        table_id: TableId,
        state: ViewState,
    ) -> Result<ViewState, FlexError> {
        Ok(self.views.put(ctx, table_id, state).await?)
    }

    #[tracing::instrument(skip_all, fields(workspace = %ctx.workspace_id, user = %ctx.user_id, %table_id))]
    pub async fn apply_view_command(
        &self,
        ctx: &RequestContext,
        table_id: TableId,
        command: ViewCommand,
    ) -> Result<ViewState, FlexError> {
        Ok(self.views.apply(ctx, table_id, command).await?)
    }

    /// Rendered column order of the caller's view
    pub async fn layout(&self, ctx: &RequestContext, table_id: TableId) -> Result<Vec<PropertyKey>, FlexError> {
        Ok(self.views.layout(ctx, table_id).await?)
    }
}
