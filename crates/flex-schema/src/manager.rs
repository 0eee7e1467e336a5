//! Schema manager
//!
//! Owns every mutation of a [`Table`]. Updates are optimistic: the caller
//! names the schema version it edited, the op batch is applied to a copy of
//! that snapshot, and the result is swapped in only if nobody else moved the
//! version in between.

use crate::error::{SchemaConflict, SchemaError};
use crate::ops::SchemaOp;
use crate::repository::{SwapOutcome, TableRepository};
use crate::table::{ApplyContext, Table};
use flex_model::{Clock, KeyPolicy, PropertySpec, PropertyTypeRegistry, RequestContext, TableId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input of [`SchemaManager::create_table`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTable {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

impl NewTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }
}

/// Table definitions: create, read, evolve, archive
#[derive(Debug, Clone)]
pub struct SchemaManager {
    repo: Arc<dyn TableRepository>,
    registry: PropertyTypeRegistry,
    clock: Arc<dyn Clock>,
    policy: KeyPolicy,
}

impl SchemaManager {
    /// Create a manager with the strict key policy
    pub fn new(repo: Arc<dyn TableRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            registry: PropertyTypeRegistry::new(),
            clock,
            policy: KeyPolicy::strict(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &PropertyTypeRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn key_policy(&self) -> KeyPolicy {
        self.policy
    }

    #[inline]
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create a table at schema version 1
    ///
    /// # Errors
    /// - `Validation` for an empty name, bad keys or bad configs (all collected)
    /// - `Conflict(DuplicateKey)` if two properties share a key
    pub async fn create_table(&self, ctx: &RequestContext, new: NewTable) -> Result<Arc<Table>, SchemaError> {
        let table = Table::create(
            ctx.workspace_id.clone(),
            ctx.user_id.clone(),
            &new.name,
            new.description,
            new.properties,
            self.apply_context(),
        )?;
        let table = Arc::new(table);
        self.repo.insert(Arc::clone(&table)).await?;

        tracing::info!(
            "Created table {} '{}' with {} properties",
            table.id,
            table.name,
            table.properties.len()
        );
        Ok(table)
    }

    /// Current snapshot of a table in the caller's workspace
    ///
    /// # Errors
    /// `NotFound` if the table is absent or belongs to another workspace
    pub async fn get_table(&self, ctx: &RequestContext, table_id: TableId) -> Result<Arc<Table>, SchemaError> {
        match self.repo.get(table_id).await? {
            Some(table) if table.workspace_id == ctx.workspace_id => Ok(table),
            _ => Err(SchemaError::NotFound(table_id)),
        }
    }

    /// Tables of the caller's workspace, oldest first
    pub async fn list_tables(
        &self,
        ctx: &RequestContext,
        include_archived: bool,
    ) -> Result<Vec<Arc<Table>>, SchemaError> {
        let tables = self.repo.list(&ctx.workspace_id).await?;
        Ok(tables
            .into_iter()
            .filter(|t| include_archived || !t.is_archived())
            .collect())
    }

    /// Apply an op batch on top of `expected_version`
    ///
    /// # Errors
    /// - `Conflict(StaleVersion)` if the table moved past `expected_version`
    /// - `Conflict(..)` / `Validation` from the ops themselves
    /// - `NotFound` if the table is not visible to the caller
    pub async fn update_schema(
        &self,
        ctx: &RequestContext,
        table_id: TableId,
        expected_version: u64,
        ops: &[SchemaOp],
    ) -> Result<Arc<Table>, SchemaError> {
        let current = self.get_table(ctx, table_id).await?;
        if current.schema_version != expected_version {
            return Err(SchemaConflict::StaleVersion {
                expected: expected_version,
                actual: current.schema_version,
            }
            .into());
        }

        let next = Arc::new(current.apply(ops, self.apply_context())?);
        let table = self.swap(next, expected_version).await?;
        tracing::info!(
            "Updated schema of table {} to version {} ({} ops)",
            table.id,
            table.schema_version,
            ops.len()
        );
        Ok(table)
    }

    /// Archive a table; archiving twice returns the archived snapshot
    pub async fn archive_table(&self, ctx: &RequestContext, table_id: TableId) -> Result<Arc<Table>, SchemaError> {
        let current = self.get_table(ctx, table_id).await?;
        if current.is_archived() {
            return Ok(current);
        }

        let next = Arc::new(current.archived(self.clock.now())?);
        let table = self.swap(next, current.schema_version).await?;
        tracing::info!("Archived table {}", table.id);
        Ok(table)
    }

    async fn swap(&self, next: Arc<Table>, expected_version: u64) -> Result<Arc<Table>, SchemaError> {
        match self.repo.compare_and_swap(Arc::clone(&next), expected_version).await? {
            SwapOutcome::Swapped => Ok(next),
            SwapOutcome::Stale { actual } => {
                tracing::debug!(
                    "Schema swap of table {} lost: expected {}, found {}",
                    next.id,
                    expected_version,
                    actual
                );
                Err(SchemaConflict::StaleVersion {
                    expected: expected_version,
                    actual,
                }
                .into())
            }
            SwapOutcome::Missing => Err(SchemaError::NotFound(next.id)),
        }
    }

    fn apply_context(&self) -> ApplyContext<'_> {
        ApplyContext {
            registry: &self.registry,
            policy: self.policy,
            now: self.clock.now(),
        }
    }
}
